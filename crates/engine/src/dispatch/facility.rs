use tracing::debug;

use crate::codes::ResultCode;
use crate::jobs::{
    ActionKind, AgentRef, Assignment, Job, JobAction, JobCategory, JobId, TransferPurpose,
    WithdrawPurpose,
};
use crate::memory::FacilityMemory;
use crate::telemetry::Instrumented;
use crate::world::{
    ActionOutcome, EntityFilter, EntityView, FacilityKind, ObjectId, RoomName, World,
};

use super::Dispatcher;

/// Towers are the only facilities that hold jobs.
const TOWER_JOBS: [JobCategory; 3] = [
    JobCategory::Attack,
    JobCategory::Heal,
    JobCategory::Repair,
];

const ROOM_RADIUS: u32 = 50;
const MAX_UPGRADE_SLOTS: usize = 8;
const ANY_FACILITY: usize = 99;

impl<W: World> Dispatcher<'_, W> {
    pub(super) fn run_facility_inner(&mut self, id: &ObjectId) -> ResultCode {
        let Some(facility) = self.world.resolve(id) else {
            return ResultCode::NotFound;
        };
        let Some(kind) = facility.facility_kind() else {
            return ResultCode::BadRequest;
        };

        let mut memory = self
            .memory
            .facilities
            .get(id)
            .cloned()
            .unwrap_or_else(|| FacilityMemory::new(facility.room.clone()));
        memory.is_not_seen_since = None;

        self.maintain_facility(&facility, kind);
        let code = if kind == FacilityKind::Tower {
            self.drive_tower(&facility, &mut memory)
        } else {
            ResultCode::Ok
        };
        self.memory.facilities.insert(id.clone(), memory);
        code
    }

    /// Per-tick upkeep that runs whether or not the facility holds a job.
    fn maintain_facility(&mut self, facility: &EntityView, kind: FacilityKind) {
        let config = self.config;
        match kind {
            FacilityKind::Tower => {
                if facility.is_damaged() {
                    self.act(&facility.id, ActionKind::Repair, &facility.id);
                }
                self.maintain_transfer(
                    facility,
                    config.tower_refill_percent,
                    TransferPurpose::General,
                    true,
                );
            }
            FacilityKind::Spawn | FacilityKind::Extension => {
                self.maintain_transfer(facility, 100, TransferPurpose::General, true);
            }
            FacilityKind::Link | FacilityKind::Container => self.maintain_store(facility, kind),
            FacilityKind::Storage => {
                self.maintain_withdraw(facility, 0, WithdrawPurpose::General);
            }
            FacilityKind::Controller => self.maintain_upgrade(facility),
            FacilityKind::Wall => {}
        }

        if facility.hits_max > 0 {
            self.maintain_repair(facility);
        }
    }

    /// Containers and links route energy by where they sit: next to the controller
    /// they feed upgraders, next to a source they buffer harvests. Elsewhere a link
    /// empties once full and a container fills up like any other store.
    fn maintain_store(&mut self, facility: &EntityView, kind: FacilityKind) {
        let config = self.config;
        let near_controller = self.world.controller(&facility.room).is_some_and(|controller| {
            controller
                .position
                .in_range_to(facility.position, config.controller_energy_range)
        });
        if near_controller {
            self.maintain_withdraw(facility, 0, WithdrawPurpose::Controller);
            return;
        }

        let near_source = !self
            .world
            .query_range(
                &facility.room,
                facility.position,
                config.source_link_range,
                EntityFilter::Sources,
            )
            .is_empty();
        match (kind, near_source) {
            (FacilityKind::Link, true) => {
                self.maintain_withdraw(facility, 0, WithdrawPurpose::General);
                self.maintain_transfer(facility, 100, TransferPurpose::Source, false);
            }
            (FacilityKind::Link, false) => {
                self.maintain_withdraw(facility, 100, WithdrawPurpose::General);
            }
            (_, true) => self.maintain_withdraw(facility, 0, WithdrawPurpose::General),
            (_, false) => {
                self.maintain_transfer(facility, 100, TransferPurpose::General, false);
            }
        }
    }

    /// Keeps one transfer job per facility while it sits below `refill_below_percent`,
    /// with the requirement tracking the current deficit.
    fn maintain_transfer(
        &mut self,
        facility: &EntityView,
        refill_below_percent: u32,
        purpose: TransferPurpose,
        has_priority: bool,
    ) {
        let action = JobAction::Transfer {
            energy_required: 0,
            purpose,
        };
        let room = &facility.room;
        let id = JobId::for_target(action.category(), &facility.id);
        let deficit = facility.energy_free();
        if deficit == 0 || facility.energy_percent() >= refill_below_percent {
            self.drop_job(room, &id, "facility_full");
            return;
        }

        let max_units = if deficit > 100 { 2 } else { 1 };
        if let Ok(job) = self.memory.jobs.job_mut(room, &id) {
            job.set_energy_required(deficit);
            job.set_max_units(max_units);
            return;
        }
        let job = Job::new(
            id,
            JobAction::Transfer {
                energy_required: deficit,
                purpose,
            },
        )
        .targeting(facility.id.clone())
        .at(facility.position)
        .with_capacity(max_units, 0)
        .with_priority(has_priority);
        self.ensure_job(room, job);
    }

    /// Offers the facility's energy for pickup once it is at least `min_percent` full.
    fn maintain_withdraw(
        &mut self,
        facility: &EntityView,
        min_percent: u32,
        purpose: WithdrawPurpose,
    ) {
        let action = JobAction::Withdraw { purpose };
        let room = &facility.room;
        let id = JobId::for_target(action.category(), &facility.id);
        if facility.energy == 0 || facility.energy_percent() < min_percent {
            self.drop_job(room, &id, "facility_empty");
            return;
        }

        let spots = self.world.open_spots(room, facility.position, 1).max(1);
        let job = Job::new(id, action)
            .targeting(facility.id.clone())
            .at(facility.position)
            .with_capacity(spots, 0);
        self.ensure_job(room, job);
    }

    fn maintain_repair(&mut self, facility: &EntityView) {
        let room = &facility.room;
        let id = JobId::for_target(JobCategory::Repair, &facility.id);
        if !facility.is_damaged() {
            self.drop_job(room, &id, "repaired");
            return;
        }
        let job = Job::new(id, JobAction::Repair)
            .targeting(facility.id.clone())
            .at(facility.position)
            .with_capacity(1, ANY_FACILITY);
        self.ensure_job(room, job);
    }

    /// An owned controller always carries an upgrade job; once its budget is spent the
    /// executor deletes it and a fresh one appears here on the next pass.
    fn maintain_upgrade(&mut self, controller: &EntityView) {
        let config = self.config;
        let room = &controller.room;
        let id = JobId::for_target(JobCategory::Upgrade, &controller.id);
        if self.memory.jobs.contains_job(room, &id) {
            return;
        }

        let slots = self
            .world
            .open_spots(room, controller.position, ActionKind::Upgrade.interaction_range())
            .clamp(1, MAX_UPGRADE_SLOTS);
        let feeder = self
            .world
            .query_range(
                room,
                controller.position,
                config.controller_energy_range,
                EntityFilter::OwnedFacilities,
            )
            .into_iter()
            .find(|view| {
                matches!(
                    view.facility_kind(),
                    Some(FacilityKind::Container | FacilityKind::Link)
                )
            });

        let mut job = Job::new(
            id,
            JobAction::Upgrade {
                energy_required: config.upgrade_energy_budget,
            },
        )
        .targeting(controller.id.clone())
        .at(controller.position)
        .with_capacity(slots, 0);
        if let Some(feeder) = feeder {
            job = job.linked_to(JobId::for_target(JobCategory::WithdrawController, &feeder.id));
        }
        self.ensure_job(room, job);
    }

    fn drive_tower(&mut self, tower: &EntityView, memory: &mut FacilityMemory) -> ResultCode {
        if let Some(job) = self.held_facility_job(tower, memory) {
            return self.execute_facility_job(tower, memory, job);
        }

        let room = tower.room.clone();
        let mut assignment = self.find_job(
            &room,
            AgentRef::Facility(&tower.id),
            Some(tower.position),
            &TOWER_JOBS,
            None,
        );
        if matches!(assignment, Ok(Assignment::NoContent)) && self.synthesize_tower_job(tower) {
            assignment = self.find_job(
                &room,
                AgentRef::Facility(&tower.id),
                Some(tower.position),
                &TOWER_JOBS,
                None,
            );
        }

        match assignment {
            Ok(Assignment::Assigned(job_id)) => {
                let Ok(job) = self.memory.jobs.get_job(&room, &job_id).cloned() else {
                    return ResultCode::NoContent;
                };
                memory.job = Some(job_id);
                self.execute_facility_job(tower, memory, job)
            }
            Ok(Assignment::NoContent) => ResultCode::NoContent,
            Err(error) => error.code(),
        }
    }

    fn held_facility_job(
        &mut self,
        facility: &EntityView,
        memory: &mut FacilityMemory,
    ) -> Option<Job> {
        let job_id = memory.job.clone()?;
        let room = &facility.room;
        let tick = self.world.tick();

        let state = self
            .memory
            .jobs
            .get_job(room, &job_id)
            .ok()
            .map(|job| (job.is_expired(tick), job.has_facility(&facility.id)));
        let live = match state {
            Some((true, _)) => {
                self.drop_job(room, &job_id, "expired");
                None
            }
            Some((false, true)) => self.memory.jobs.get_job(room, &job_id).ok().cloned(),
            Some((false, false)) => self
                .memory
                .jobs
                .assign_facility(room, &job_id, &facility.id)
                .ok()
                .and_then(|()| self.memory.jobs.get_job(room, &job_id).ok().cloned()),
            None => None,
        };
        if live.is_none() {
            self.memory.jobs.unassign_facility(room, &job_id, &facility.id);
            memory.job = None;
        }
        live
    }

    /// Creates an attack job on the nearest hostile or, failing that, a heal job on the
    /// most injured owned unit. Returns whether a new job now exists.
    fn synthesize_tower_job(&mut self, tower: &EntityView) -> bool {
        let room = &tower.room;
        let hostiles = self
            .world
            .query_range(room, tower.position, ROOM_RADIUS, EntityFilter::Hostiles);
        if let Some(hostile) = hostiles
            .iter()
            .min_by_key(|view| view.position.range_to(tower.position))
        {
            let job = Job::new(
                JobId::for_target(JobCategory::Attack, &hostile.id),
                JobAction::Attack,
            )
            .targeting(hostile.id.clone())
            .at(hostile.position)
            .with_capacity(4, ANY_FACILITY)
            .with_priority(true);
            return self.ensure_job(room, job) == ResultCode::Created;
        }

        let injured = self
            .world
            .query_range(room, tower.position, ROOM_RADIUS, EntityFilter::OwnedUnits);
        if let Some(patient) = injured
            .iter()
            .filter(|view| view.is_damaged())
            .max_by_key(|view| view.hits_max - view.hits)
        {
            let job = Job::new(
                JobId::for_target(JobCategory::Heal, &patient.id),
                JobAction::Heal {
                    stop_at_max_hits: false,
                },
            )
            .targeting(patient.id.clone())
            .at(patient.position)
            .with_capacity(1, ANY_FACILITY);
            return self.ensure_job(room, job) == ResultCode::Created;
        }
        false
    }

    fn execute_facility_job(
        &mut self,
        facility: &EntityView,
        memory: &mut FacilityMemory,
        job: Job,
    ) -> ResultCode {
        let name = match job.kind() {
            ActionKind::Attack => "execute_facility_attack",
            ActionKind::Heal => "execute_facility_heal",
            ActionKind::Repair => "execute_facility_repair",
            _ => "execute_facility_unsupported",
        };
        let args = (facility.id.to_string(), job.id.to_string());
        self.instrumented(name, args, |d| {
            d.execute_facility_job_inner(facility, memory, &job)
        })
    }

    fn execute_facility_job_inner(
        &mut self,
        facility: &EntityView,
        memory: &mut FacilityMemory,
        job: &Job,
    ) -> ResultCode {
        let room = facility.room.clone();
        let Some(target) = job.target.as_ref().and_then(|id| self.world.resolve(id)) else {
            self.discard_facility_job(&room, memory, job, "target_missing");
            return ResultCode::NoContent;
        };

        match job.action {
            JobAction::Attack => {}
            JobAction::Heal { stop_at_max_hits } => {
                if stop_at_max_hits && !facility.is_damaged() {
                    self.discard_facility_job(&room, memory, job, "healer_at_max_hits");
                    return ResultCode::NoContent;
                }
                if !target.is_damaged() {
                    self.discard_facility_job(&room, memory, job, "target_healed");
                    return ResultCode::NoContent;
                }
            }
            JobAction::Repair => {
                if !target.is_damaged() {
                    self.discard_facility_job(&room, memory, job, "target_repaired");
                    return ResultCode::NoContent;
                }
            }
            _ => {
                self.memory.jobs.unassign_facility(&room, &job.id, &facility.id);
                memory.job = None;
                return ResultCode::BadRequest;
            }
        }

        match self.act(&facility.id, job.kind(), &target.id) {
            ActionOutcome::Ok => ResultCode::Ok,
            ActionOutcome::InvalidTarget => {
                self.discard_facility_job(&room, memory, job, "invalid_target");
                ResultCode::InvalidTarget
            }
            ActionOutcome::NotEnoughResources => {
                self.memory.jobs.unassign_facility(&room, &job.id, &facility.id);
                memory.job = None;
                ResultCode::ResourceExhausted
            }
            outcome => {
                debug!(
                    facility = %facility.id,
                    job = %job.id,
                    ?outcome,
                    "facility_action_declined"
                );
                self.memory.jobs.unassign_facility(&room, &job.id, &facility.id);
                memory.job = None;
                ResultCode::NoContent
            }
        }
    }

    fn discard_facility_job(
        &mut self,
        room: &RoomName,
        memory: &mut FacilityMemory,
        job: &Job,
        reason: &'static str,
    ) {
        self.drop_job(room, &job.id, reason);
        memory.job = None;
    }
}
