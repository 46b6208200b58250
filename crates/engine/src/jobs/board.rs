use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::codes::DispatchError;
use crate::jobs::types::{Job, JobId};
use crate::world::{ObjectId, RoomName};

/// Jobs of one room in insertion order. Order is part of the assignment tie-break, so
/// replacing an existing job keeps its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomJobTable {
    jobs: Vec<Job>,
}

impl RoomJobTable {
    pub fn get(&self, id: &JobId) -> Option<&Job> {
        self.jobs.iter().find(|job| &job.id == id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut Job> {
        self.jobs.iter_mut().find(|job| &job.id == id)
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.get(id).is_some()
    }

    /// Returns true when the job was new.
    pub fn upsert(&mut self, job: Job) -> bool {
        match self.get_mut(&job.id) {
            Some(existing) => {
                *existing = job;
                false
            }
            None => {
                self.jobs.push(job);
                true
            }
        }
    }

    pub fn remove(&mut self, id: &JobId) -> Option<Job> {
        let index = self.jobs.iter().position(|job| &job.id == id)?;
        Some(self.jobs.remove(index))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.jobs.iter()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Room-scoped job store. The same job id may exist in two rooms without collision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobBoard {
    rooms: BTreeMap<RoomName, RoomJobTable>,
}

impl JobBoard {
    pub fn table(&self, room: &RoomName) -> Option<&RoomJobTable> {
        self.rooms.get(room)
    }

    pub fn table_mut(&mut self, room: &RoomName) -> &mut RoomJobTable {
        self.rooms.entry(room.clone()).or_default()
    }

    pub fn rooms(&self) -> impl Iterator<Item = (&RoomName, &RoomJobTable)> {
        self.rooms.iter()
    }

    /// Inserts or replaces by id; returns true when the job was new.
    pub fn upsert_job(&mut self, room: &RoomName, job: Job) -> bool {
        self.table_mut(room).upsert(job)
    }

    pub fn get_job(&self, room: &RoomName, id: &JobId) -> Result<&Job, DispatchError> {
        self.rooms
            .get(room)
            .and_then(|table| table.get(id))
            .ok_or_else(|| DispatchError::not_found("job", id))
    }

    pub fn job_mut(&mut self, room: &RoomName, id: &JobId) -> Result<&mut Job, DispatchError> {
        self.rooms
            .get_mut(room)
            .and_then(|table| table.get_mut(id))
            .ok_or_else(|| DispatchError::not_found("job", id))
    }

    pub fn contains_job(&self, room: &RoomName, id: &JobId) -> bool {
        self.get_job(room, id).is_ok()
    }

    /// Snapshot of a room's jobs; empty for rooms never written.
    pub fn load_jobs(&self, room: &RoomName) -> Vec<Job> {
        self.rooms
            .get(room)
            .map(|table| table.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deleting a job that does not exist is not an error.
    pub fn delete_job(&mut self, room: &RoomName, id: &JobId) -> Option<Job> {
        self.rooms.get_mut(room).and_then(|table| table.remove(id))
    }

    pub fn delete_room(&mut self, room: &RoomName) -> Option<RoomJobTable> {
        self.rooms.remove(room)
    }

    pub fn job_count(&self, room: &RoomName) -> usize {
        self.rooms.get(room).map_or(0, RoomJobTable::len)
    }

    pub fn assign_unit(
        &mut self,
        room: &RoomName,
        id: &JobId,
        unit: &ObjectId,
    ) -> Result<(), DispatchError> {
        let job = self.job_mut(room, id)?;
        if job.has_unit(unit) {
            return Ok(());
        }
        if job.assigned_units.len() >= job.max_units {
            return Err(DispatchError::CapacityExceeded {
                job_id: id.to_string(),
            });
        }
        job.assigned_units.push(unit.clone());
        Ok(())
    }

    pub fn assign_facility(
        &mut self,
        room: &RoomName,
        id: &JobId,
        facility: &ObjectId,
    ) -> Result<(), DispatchError> {
        let job = self.job_mut(room, id)?;
        if job.has_facility(facility) {
            return Ok(());
        }
        if job.assigned_facilities.len() >= job.max_facilities {
            return Err(DispatchError::CapacityExceeded {
                job_id: id.to_string(),
            });
        }
        job.assigned_facilities.push(facility.clone());
        Ok(())
    }

    /// Returns true when the unit was listed on the job.
    pub fn unassign_unit(&mut self, room: &RoomName, id: &JobId, unit: &ObjectId) -> bool {
        let Ok(job) = self.job_mut(room, id) else {
            return false;
        };
        let before = job.assigned_units.len();
        job.assigned_units.retain(|assigned| assigned != unit);
        before != job.assigned_units.len()
    }

    pub fn unassign_facility(&mut self, room: &RoomName, id: &JobId, facility: &ObjectId) -> bool {
        let Ok(job) = self.job_mut(room, id) else {
            return false;
        };
        let before = job.assigned_facilities.len();
        job.assigned_facilities.retain(|assigned| assigned != facility);
        before != job.assigned_facilities.len()
    }

    /// Drops an agent from every job in the room.
    pub fn forget_agent(&mut self, room: &RoomName, agent: &ObjectId) -> usize {
        let Some(table) = self.rooms.get_mut(room) else {
            return 0;
        };
        let mut removed = 0;
        for job in table.jobs.iter_mut() {
            let before = job.assigned_units.len() + job.assigned_facilities.len();
            job.assigned_units.retain(|assigned| assigned != agent);
            job.assigned_facilities.retain(|assigned| assigned != agent);
            removed += before - job.assigned_units.len() - job.assigned_facilities.len();
        }
        removed
    }

    /// Keeps only assignments whose agents are still known.
    pub fn retain_live_agents(&mut self, room: &RoomName, live_ids: &BTreeSet<ObjectId>) {
        let Some(table) = self.rooms.get_mut(room) else {
            return;
        };
        for job in table.jobs.iter_mut() {
            job.assigned_units.retain(|id| live_ids.contains(id));
            job.assigned_facilities.retain(|id| live_ids.contains(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobAction;
    use crate::world::Position;

    fn room(name: &str) -> RoomName {
        RoomName::from(name)
    }

    fn harvest_job(max_units: usize) -> Job {
        let source = ObjectId::from("src1");
        Job::new(
            JobId::for_target(crate::jobs::JobCategory::Harvest, &source),
            JobAction::Harvest,
        )
        .targeting(source)
        .at(Position::new(10, 10))
        .with_capacity(max_units, 0)
    }

    #[test]
    fn assignment_never_exceeds_capacity_and_is_idempotent() {
        let mut board = JobBoard::default();
        let home = room("W1N1");
        let job = harvest_job(2);
        let id = job.id.clone();
        board.upsert_job(&home, job);

        board
            .assign_unit(&home, &id, &ObjectId::from("u1"))
            .expect("first");
        board
            .assign_unit(&home, &id, &ObjectId::from("u1"))
            .expect("repeat is a no-op");
        board
            .assign_unit(&home, &id, &ObjectId::from("u2"))
            .expect("second");
        let error = board
            .assign_unit(&home, &id, &ObjectId::from("u3"))
            .expect_err("full");
        assert!(matches!(error, DispatchError::CapacityExceeded { .. }));

        let job = board.get_job(&home, &id).expect("job");
        assert_eq!(
            job.assigned_units,
            vec![ObjectId::from("u1"), ObjectId::from("u2")]
        );
    }

    #[test]
    fn facility_assignment_uses_its_own_capacity() {
        let mut board = JobBoard::default();
        let home = room("W1N1");
        let job = harvest_job(5);
        let id = job.id.clone();
        board.upsert_job(&home, job);

        let error = board
            .assign_facility(&home, &id, &ObjectId::from("tower1"))
            .expect_err("no facility slots");
        assert!(matches!(error, DispatchError::CapacityExceeded { .. }));
    }

    #[test]
    fn deleting_missing_job_is_harmless() {
        let mut board = JobBoard::default();
        let home = room("W1N1");
        assert!(board
            .delete_job(&home, &JobId("build-1/1-x".to_string()))
            .is_none());
        assert!(!board.unassign_unit(&home, &JobId("nope".to_string()), &ObjectId::from("u1")));
        assert!(matches!(
            board.get_job(&home, &JobId("nope".to_string())),
            Err(DispatchError::NotFound { what: "job", .. })
        ));
    }

    #[test]
    fn same_id_in_two_rooms_does_not_collide() {
        let mut board = JobBoard::default();
        let (a, b) = (room("W1N1"), room("W2N1"));
        let job = harvest_job(1);
        let id = job.id.clone();
        board.upsert_job(&a, job.clone());
        board.upsert_job(&b, job);

        board
            .assign_unit(&a, &id, &ObjectId::from("u1"))
            .expect("assign in a");
        board.delete_job(&b, &id);

        assert!(board.get_job(&b, &id).is_err());
        assert_eq!(
            board.get_job(&a, &id).expect("a keeps job").assigned_units,
            vec![ObjectId::from("u1")]
        );
    }

    #[test]
    fn upsert_keeps_table_order() {
        let mut board = JobBoard::default();
        let home = room("W1N1");
        let first = harvest_job(1);
        let second = Job::new(JobId("attack-h1".to_string()), JobAction::Attack);
        board.upsert_job(&home, first.clone());
        board.upsert_job(&home, second);
        assert!(!board.upsert_job(&home, first.with_priority(true)));

        let ids: Vec<_> = board
            .load_jobs(&home)
            .into_iter()
            .map(|job| job.id.0)
            .collect();
        assert_eq!(ids, vec!["harvest-src1", "attack-h1"]);
    }

    #[test]
    fn retain_live_agents_drops_dead_assignments() {
        let mut board = JobBoard::default();
        let home = room("W1N1");
        let job = harvest_job(3);
        let id = job.id.clone();
        board.upsert_job(&home, job);
        board
            .assign_unit(&home, &id, &ObjectId::from("u1"))
            .expect("u1");
        board
            .assign_unit(&home, &id, &ObjectId::from("u2"))
            .expect("u2");

        let live = BTreeSet::from([ObjectId::from("u2")]);
        board.retain_live_agents(&home, &live);
        assert_eq!(
            board.get_job(&home, &id).expect("job").assigned_units,
            vec![ObjectId::from("u2")]
        );
        assert_eq!(board.forget_agent(&home, &ObjectId::from("u2")), 1);
    }
}
