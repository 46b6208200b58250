//! Durable bot state: room jobs, per-agent records, and averaged statistics.

mod atomic_io;
mod checksum;
mod snapshot;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::UnitRole;
use crate::jobs::{JobBoard, JobId};
use crate::telemetry::AveragedStats;
use crate::world::{ObjectId, RoomName};

pub use snapshot::{
    manifest_path, memory_path, SnapshotError, SnapshotManifest, SnapshotStore,
    MEMORY_FORMAT_VERSION,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomMemory {
    pub initialized_at: u64,
    #[serde(default)]
    pub is_not_seen_since: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitMemory {
    pub role: UnitRole,
    pub room: RoomName,
    #[serde(default)]
    pub job: Option<JobId>,
    #[serde(default)]
    pub secondary_job: Option<JobId>,
    #[serde(default)]
    pub is_not_seen_since: Option<u64>,
}

impl UnitMemory {
    pub fn new(role: UnitRole, room: RoomName) -> Self {
        Self {
            role,
            room,
            job: None,
            secondary_job: None,
            is_not_seen_since: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacilityMemory {
    pub room: RoomName,
    #[serde(default)]
    pub job: Option<JobId>,
    #[serde(default)]
    pub is_not_seen_since: Option<u64>,
}

impl FacilityMemory {
    pub fn new(room: RoomName) -> Self {
        Self {
            room,
            job: None,
            is_not_seen_since: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    #[serde(default)]
    pub rooms: BTreeMap<RoomName, RoomMemory>,
    #[serde(default)]
    pub jobs: JobBoard,
    #[serde(default)]
    pub units: BTreeMap<ObjectId, UnitMemory>,
    #[serde(default)]
    pub facilities: BTreeMap<ObjectId, FacilityMemory>,
    #[serde(default)]
    pub stats: AveragedStats,
}

impl Memory {
    /// Removes the unit's record and every assignment it held in its room.
    pub fn forget_unit(&mut self, id: &ObjectId) -> Option<UnitMemory> {
        let memory = self.units.remove(id)?;
        self.jobs.forget_agent(&memory.room, id);
        Some(memory)
    }

    pub fn forget_facility(&mut self, id: &ObjectId) -> Option<FacilityMemory> {
        let memory = self.facilities.remove(id)?;
        self.jobs.forget_agent(&memory.room, id);
        Some(memory)
    }

    /// Drops a room with its jobs and the agents that lived there.
    pub fn forget_room(&mut self, room: &RoomName) -> Option<RoomMemory> {
        self.jobs.delete_room(room);
        self.units.retain(|_, unit| &unit.room != room);
        self.facilities.retain(|_, facility| &facility.room != room);
        self.stats.rooms.remove(room);
        self.rooms.remove(room)
    }
}

/// Where memory lives between ticks.
pub trait MemoryStore {
    fn load(&mut self) -> Result<Memory, SnapshotError>;
    fn save(&mut self, memory: &Memory, tick: u64) -> Result<(), SnapshotError>;
}

/// Keeps the last saved memory as encoded JSON, so a load always goes through the
/// same decoding path as a disk snapshot.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    encoded: Option<String>,
    saved_tick: Option<u64>,
}

impl InMemoryStore {
    pub fn saved_tick(&self) -> Option<u64> {
        self.saved_tick
    }
}

impl MemoryStore for InMemoryStore {
    fn load(&mut self) -> Result<Memory, SnapshotError> {
        match &self.encoded {
            Some(raw) => snapshot::decode_memory(std::path::Path::new("<memory>"), raw),
            None => Ok(Memory::default()),
        }
    }

    fn save(&mut self, memory: &Memory, tick: u64) -> Result<(), SnapshotError> {
        let encoded =
            serde_json::to_string(memory).map_err(|error| SnapshotError::InvalidFormat {
                path: "<memory>".into(),
                message: format!("failed to encode memory json: {error}"),
            })?;
        self.encoded = Some(encoded);
        self.saved_tick = Some(tick);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, JobAction, JobCategory};
    use crate::telemetry::AveragedRoom;

    fn seeded_memory() -> Memory {
        let room = RoomName::from("W1N1");
        let mut memory = Memory::default();
        memory.rooms.insert(
            room.clone(),
            RoomMemory {
                initialized_at: 3,
                is_not_seen_since: None,
            },
        );
        let source = ObjectId::from("s1");
        let job = Job::new(
            JobId::for_target(JobCategory::Harvest, &source),
            JobAction::Harvest,
        )
        .targeting(source)
        .with_capacity(2, 0);
        let job_id = job.id.clone();
        memory.jobs.upsert_job(&room, job);
        memory
            .jobs
            .assign_unit(&room, &job_id, &ObjectId::from("u1"))
            .expect("assign");
        let mut unit = UnitMemory::new(UnitRole::Work, room.clone());
        unit.job = Some(job_id);
        memory.units.insert(ObjectId::from("u1"), unit);
        memory
            .facilities
            .insert(ObjectId::from("f1"), FacilityMemory::new(room));
        memory
    }

    #[test]
    fn in_memory_store_round_trips_through_json() {
        let mut store = InMemoryStore::default();
        assert_eq!(store.load().expect("empty load"), Memory::default());

        let memory = seeded_memory();
        store.save(&memory, 9).expect("save");
        assert_eq!(store.saved_tick(), Some(9));
        assert_eq!(store.load().expect("load"), memory);
    }

    #[test]
    fn forgetting_a_unit_releases_its_assignments() {
        let mut memory = seeded_memory();
        let room = RoomName::from("W1N1");
        let removed = memory.forget_unit(&ObjectId::from("u1")).expect("known unit");
        assert_eq!(removed.role, UnitRole::Work);
        let job = memory
            .jobs
            .get_job(&room, &JobId("harvest-s1".to_string()))
            .expect("job survives");
        assert!(job.assigned_units.is_empty());
        assert!(memory.forget_unit(&ObjectId::from("u1")).is_none());
    }

    #[test]
    fn forgetting_a_room_drops_its_agents_and_jobs() {
        let mut memory = seeded_memory();
        let room = RoomName::from("W1N1");
        memory
            .stats
            .rooms
            .insert(room.clone(), AveragedRoom::default());
        assert!(memory.forget_room(&room).is_some());
        assert!(memory.stats.rooms.is_empty());
        assert!(memory.units.is_empty());
        assert!(memory.facilities.is_empty());
        assert_eq!(memory.jobs.job_count(&room), 0);
    }
}
