//! Per-tick scheduling: rooms are scanned for work, facilities run before units, and
//! every agent either continues its job or asks the assignment policy for a new one.
//!
//! The dispatcher borrows the world, memory and telemetry for the duration of one
//! tick. It assumes single-threaded use; nothing here synchronizes.

mod facility;
mod movement;
mod scan;
mod unit;


use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::codes::{DispatchError, ResultCode};
use crate::config::DispatchConfig;
use crate::jobs::{
    assign_new_job, AgentRef, Assignment, AssignmentRequest, Job, JobCategory, JobId,
};
use crate::memory::{Memory, RoomMemory};
use crate::telemetry::{Instrumented, Telemetry};
use crate::world::{ObjectId, Position, RoomName, World};

pub struct Dispatcher<'a, W: World> {
    world: &'a mut W,
    memory: &'a mut Memory,
    telemetry: &'a mut Telemetry,
    config: &'a DispatchConfig,
}

impl<W: World> Instrumented for Dispatcher<'_, W> {
    fn telemetry_mut(&mut self) -> &mut Telemetry {
        self.telemetry
    }
}

impl<'a, W: World> Dispatcher<'a, W> {
    pub fn new(
        world: &'a mut W,
        memory: &'a mut Memory,
        telemetry: &'a mut Telemetry,
        config: &'a DispatchConfig,
    ) -> Self {
        Self {
            world,
            memory,
            telemetry,
            config,
        }
    }

    pub fn tick(&self) -> u64 {
        self.world.tick()
    }

    pub fn upsert_job(&mut self, room: &RoomName, job: Job) -> ResultCode {
        let args = (room.to_string(), job.id.to_string());
        self.instrumented("upsert_job", args, |d| {
            if d.memory.jobs.upsert_job(room, job) {
                ResultCode::Created
            } else {
                ResultCode::Ok
            }
        })
    }

    pub fn get_job(&mut self, room: &RoomName, id: &JobId) -> Result<Job, DispatchError> {
        self.instrumented("get_job", (room.to_string(), id.to_string()), |d| {
            d.memory.jobs.get_job(room, id).cloned()
        })
    }

    pub fn delete_job(&mut self, room: &RoomName, id: &JobId) -> ResultCode {
        self.instrumented("delete_job", (room.to_string(), id.to_string()), |d| {
            d.memory.jobs.delete_job(room, id);
            ResultCode::Ok
        })
    }

    pub fn assign_unit(
        &mut self,
        room: &RoomName,
        id: &JobId,
        unit: &ObjectId,
    ) -> Result<(), DispatchError> {
        let args = (room.to_string(), id.to_string(), unit.to_string());
        self.instrumented("assign_unit", args, |d| {
            d.memory.jobs.assign_unit(room, id, unit)
        })
    }

    pub fn unassign_unit(&mut self, room: &RoomName, id: &JobId, unit: &ObjectId) -> ResultCode {
        let args = (room.to_string(), id.to_string(), unit.to_string());
        self.instrumented("unassign_unit", args, |d| {
            d.memory.jobs.unassign_unit(room, id, unit);
            ResultCode::Ok
        })
    }

    pub fn assign_facility(
        &mut self,
        room: &RoomName,
        id: &JobId,
        facility: &ObjectId,
    ) -> Result<(), DispatchError> {
        let args = (room.to_string(), id.to_string(), facility.to_string());
        self.instrumented("assign_facility", args, |d| {
            d.memory.jobs.assign_facility(room, id, facility)
        })
    }

    pub fn unassign_facility(
        &mut self,
        room: &RoomName,
        id: &JobId,
        facility: &ObjectId,
    ) -> ResultCode {
        let args = (room.to_string(), id.to_string(), facility.to_string());
        self.instrumented("unassign_facility", args, |d| {
            d.memory.jobs.unassign_facility(room, id, facility);
            ResultCode::Ok
        })
    }

    pub fn assign_new_job(
        &mut self,
        room: &RoomName,
        agent: AgentRef<'_>,
        position: Option<Position>,
        categories: &[JobCategory],
    ) -> Result<Assignment, DispatchError> {
        let args = (room.to_string(), agent.id().to_string(), categories.to_vec());
        self.instrumented("assign_new_job", args, |d| {
            d.find_job(room, agent, position, categories, None)
        })
    }

    /// One full pass: every known or visible room, then the telemetry fold.
    pub fn run_tick(&mut self) -> ResultCode {
        let tick = self.world.tick();
        self.instrumented("run_tick", tick, |d| {
            let mut rooms: BTreeSet<RoomName> = d.world.room_names().into_iter().collect();
            rooms.extend(d.memory.rooms.keys().cloned());
            for room in &rooms {
                let code = d.run_room(room);
                if code == ResultCode::InternalError {
                    warn!(room = %room, tick, "room_run_faulted");
                }
            }
            d.fold_telemetry()
        })
    }

    pub fn run_room(&mut self, room: &RoomName) -> ResultCode {
        self.instrumented("run_room", room.to_string(), |d| d.run_room_inner(room))
    }

    pub fn run_unit(&mut self, id: &ObjectId) -> ResultCode {
        self.instrumented("run_unit", id.to_string(), |d| d.run_unit_inner(id))
    }

    pub fn run_facility(&mut self, id: &ObjectId) -> ResultCode {
        self.instrumented("run_facility", id.to_string(), |d| d.run_facility_inner(id))
    }

    fn run_room_inner(&mut self, room: &RoomName) -> ResultCode {
        let tick = self.world.tick();
        if !self.world.room_visible(room) {
            return self.mark_room_unseen(room, tick);
        }

        match self.memory.rooms.get_mut(room) {
            Some(room_memory) => room_memory.is_not_seen_since = None,
            None => {
                self.memory.rooms.insert(
                    room.clone(),
                    RoomMemory {
                        initialized_at: tick,
                        is_not_seen_since: None,
                    },
                );
                info!(room = %room, tick, "room_initialized");
                return ResultCode::Created;
            }
        }

        self.scan_room(room);
        let facilities = self.world.facilities_in_room(room);
        let units = self.world.units_in_room(room);
        self.sweep_stale_agents(room, &units, &facilities, tick);

        for id in &facilities {
            self.run_facility(id);
        }
        for id in &units {
            self.run_unit(id);
        }

        let jobs = self.memory.jobs.job_count(room);
        if let Some(stats) = self.telemetry.room_mut(room) {
            stats.units = units.len() as u32;
            stats.facilities = facilities.len() as u32;
            stats.jobs = jobs as u32;
        }
        ResultCode::Ok
    }

    fn mark_room_unseen(&mut self, room: &RoomName, tick: u64) -> ResultCode {
        let grace = self.config.save_unloaded_for_ticks;
        let Some(room_memory) = self.memory.rooms.get_mut(room) else {
            return ResultCode::NotFound;
        };
        let since = *room_memory.is_not_seen_since.get_or_insert(tick);
        if tick.saturating_sub(since) >= grace {
            self.memory.forget_room(room);
            info!(room = %room, since, tick, "room_memory_removed");
        }
        ResultCode::NotFound
    }

    fn fold_telemetry(&mut self) -> ResultCode {
        let over_ticks = self.config.average_over_ticks;
        match self.telemetry.fold_into(&mut self.memory.stats, over_ticks) {
            ResultCode::TargetOnDelayOrOff => ResultCode::Ok,
            code => code,
        }
    }

    /// Assignment policy without the wrapper, for use inside executors.
    fn find_job(
        &mut self,
        room: &RoomName,
        agent: AgentRef<'_>,
        position: Option<Position>,
        categories: &[JobCategory],
        exclude: Option<&JobId>,
    ) -> Result<Assignment, DispatchError> {
        let request = AssignmentRequest {
            agent,
            position,
            categories,
            tick: self.world.tick(),
            exclude,
        };
        let assignment = assign_new_job(&mut self.memory.jobs, room, &request)?;
        if let Assignment::Assigned(job_id) = &assignment {
            debug!(room = %room, agent = %agent.id(), job = %job_id, "job_assigned");
        }
        Ok(assignment)
    }

    /// Creates the job unless one with the same id already exists.
    fn ensure_job(&mut self, room: &RoomName, job: Job) -> ResultCode {
        if self.memory.jobs.contains_job(room, &job.id) {
            return ResultCode::NotModified;
        }
        debug!(room = %room, job = %job.id, "job_created");
        self.memory.jobs.upsert_job(room, job);
        ResultCode::Created
    }

    fn drop_job(&mut self, room: &RoomName, id: &JobId, reason: &'static str) {
        if self.memory.jobs.delete_job(room, id).is_some() {
            debug!(room = %room, job = %id, reason, "job_deleted");
        }
    }
}
