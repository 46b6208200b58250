use tracing::{debug, info};

use crate::codes::ResultCode;
use crate::config::UnitRole;
use crate::jobs::{ActionKind, AgentRef, Assignment, Job, JobAction};
use crate::memory::UnitMemory;
use crate::telemetry::Instrumented;
use crate::world::{ActionOutcome, EntityView, ObjectId, RoomName, World};

use super::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum JobSlot {
    Primary,
    Secondary,
}

/// A unit's view and a working copy of its memory for the duration of one run.
#[derive(Debug)]
pub(super) struct UnitTurn {
    pub unit: EntityView,
    pub memory: UnitMemory,
}

impl UnitTurn {
    fn room(&self) -> RoomName {
        self.memory.room.clone()
    }

    fn work_parts(&self) -> u32 {
        self.unit.body().map_or(0, |body| body.work)
    }

    fn clear(&mut self, slot: JobSlot) {
        match slot {
            JobSlot::Primary => self.memory.job = None,
            JobSlot::Secondary => self.memory.secondary_job = None,
        }
    }
}

fn executor_name(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Move => "execute_move",
        ActionKind::Transfer => "execute_transfer",
        ActionKind::Withdraw => "execute_withdraw",
        ActionKind::Harvest => "execute_harvest",
        ActionKind::Build => "execute_build",
        ActionKind::Repair => "execute_repair",
        ActionKind::Dismantle => "execute_dismantle",
        ActionKind::Upgrade => "execute_upgrade",
        ActionKind::Attack => "execute_attack",
        ActionKind::Claim => "execute_claim",
        ActionKind::Heal => "execute_heal",
    }
}

impl<W: World> Dispatcher<'_, W> {
    pub(super) fn run_unit_inner(&mut self, id: &ObjectId) -> ResultCode {
        // Only owned units take jobs; anything else is not ours to drive.
        let Some(unit) = self.world.resolve(id).filter(|unit| unit.owned) else {
            return ResultCode::NotFound;
        };
        let Some(body) = unit.body() else {
            return ResultCode::BadRequest;
        };

        let mut memory = match self.memory.units.get(id) {
            Some(memory) => memory.clone(),
            None => {
                let role = UnitRole::classify(body);
                info!(unit = %id, role = %role, room = %unit.room, "unit_initialized");
                UnitMemory::new(role, unit.room.clone())
            }
        };
        memory.is_not_seen_since = None;
        if memory.room != unit.room {
            self.memory.jobs.forget_agent(&memory.room, id);
            debug!(unit = %id, from = %memory.room, to = %unit.room, "unit_changed_room");
            memory.room = unit.room.clone();
            memory.job = None;
            memory.secondary_job = None;
        }

        let mut turn = UnitTurn { unit, memory };
        let code = self.drive_unit(&mut turn);
        self.memory.units.insert(id.clone(), turn.memory);
        code
    }

    fn drive_unit(&mut self, turn: &mut UnitTurn) -> ResultCode {
        if let Some(job) = self.held_job(turn, JobSlot::Secondary) {
            return self.execute_unit_job(turn, job, JobSlot::Secondary);
        }
        if let Some(job) = self.held_job(turn, JobSlot::Primary) {
            return self.execute_unit_job(turn, job, JobSlot::Primary);
        }

        // Idle: one assignment attempt, one execution. A job that turns out invalid
        // leaves the unit idle until next tick.
        let config = self.config;
        let categories = config.roles.jobs_for(turn.memory.role);
        if categories.is_empty() {
            return ResultCode::NoContent;
        }
        let room = turn.room();
        let assignment = self.find_job(
            &room,
            AgentRef::Unit(&turn.unit.id),
            Some(turn.unit.position),
            categories,
            None,
        );
        match assignment {
            Ok(Assignment::Assigned(job_id)) => {
                let Ok(job) = self.memory.jobs.get_job(&room, &job_id).cloned() else {
                    return ResultCode::NoContent;
                };
                turn.memory.job = Some(job_id);
                self.execute_unit_job(turn, job, JobSlot::Primary)
            }
            Ok(Assignment::NoContent) => ResultCode::NoContent,
            Err(error) => error.code(),
        }
    }

    /// The job behind a memory reference, if it still exists, is live, and still lists
    /// the unit. Stale references are cleared.
    fn held_job(&mut self, turn: &mut UnitTurn, slot: JobSlot) -> Option<Job> {
        let job_id = match slot {
            JobSlot::Primary => turn.memory.job.clone()?,
            JobSlot::Secondary => turn.memory.secondary_job.clone()?,
        };
        let room = turn.room();
        let tick = self.world.tick();
        let unit_id = turn.unit.id.clone();

        let state = self
            .memory
            .jobs
            .get_job(&room, &job_id)
            .ok()
            .map(|job| (job.is_expired(tick), job.has_unit(&unit_id)));
        let live = match state {
            Some((true, _)) => {
                self.drop_job(&room, &job_id, "expired");
                None
            }
            Some((false, true)) => self.memory.jobs.get_job(&room, &job_id).ok().cloned(),
            Some((false, false)) => self
                .memory
                .jobs
                .assign_unit(&room, &job_id, &unit_id)
                .ok()
                .and_then(|()| self.memory.jobs.get_job(&room, &job_id).ok().cloned()),
            None => None,
        };
        if live.is_none() {
            self.memory.jobs.unassign_unit(&room, &job_id, &unit_id);
            turn.clear(slot);
            debug!(unit = %unit_id, job = %job_id, "unit_job_reference_cleared");
        }
        live
    }

    fn throughput(&self, turn: &UnitTurn, kind: ActionKind) -> u32 {
        turn.work_parts() * self.config.throughput.per_work_part(kind)
    }

    fn execute_unit_job(&mut self, turn: &mut UnitTurn, job: Job, slot: JobSlot) -> ResultCode {
        let name = executor_name(job.kind());
        let args = (turn.unit.id.to_string(), job.id.to_string());
        let room = turn.room();
        self.telemetry.count_unit_on_job(&room, job.category());
        self.instrumented(name, args, |d| d.execute_unit_job_inner(turn, &job, slot))
    }

    fn execute_unit_job_inner(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
    ) -> ResultCode {
        let target = match &job.target {
            Some(target_id) => match self.world.resolve(target_id) {
                Some(view) => Some(view),
                None => {
                    self.discard(turn, job, slot, "target_missing");
                    return ResultCode::NoContent;
                }
            },
            None => None,
        };

        let Some(target) = target else {
            return match job.action {
                JobAction::Move => self.execute_move(turn, job, slot, None),
                _ => {
                    self.discard(turn, job, slot, "target_required");
                    ResultCode::InvalidTarget
                }
            };
        };

        match job.action {
            JobAction::Move => self.execute_move(turn, job, slot, Some(&target)),
            JobAction::Transfer { .. } => self.execute_transfer(turn, job, slot, &target),
            JobAction::Withdraw { .. } => self.execute_withdraw(turn, job, slot, &target),
            JobAction::Harvest => self.execute_harvest(turn, job, slot, &target),
            JobAction::Build { .. } => self.execute_build(turn, job, slot, &target),
            JobAction::Repair => self.execute_repair(turn, job, slot, &target),
            JobAction::Dismantle => self.execute_dismantle(turn, job, slot, &target),
            JobAction::Upgrade { .. } => self.execute_upgrade(turn, job, slot, &target),
            JobAction::Attack => self.execute_attack(turn, job, slot, &target),
            JobAction::Claim => self.execute_claim(turn, job, slot, &target),
            JobAction::Heal { stop_at_max_hits } => {
                self.execute_heal(turn, job, slot, &target, stop_at_max_hits)
            }
        }
    }

    fn execute_move(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: Option<&EntityView>,
    ) -> ResultCode {
        let Some(destination) = target.map(|view| view.position).or(job.position) else {
            self.discard(turn, job, slot, "no_destination");
            return ResultCode::InvalidTarget;
        };
        match self.approach(&turn.unit, destination, 0) {
            ResultCode::NotModified => {
                self.discard(turn, job, slot, "arrived");
                ResultCode::Ok
            }
            code => code,
        }
    }

    fn execute_transfer(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        if job.requirement_met() {
            self.discard(turn, job, slot, "requirement_met");
            return ResultCode::NoContent;
        }
        let amount = turn.unit.energy.min(target.energy_free());
        match self.act(&turn.unit.id, ActionKind::Transfer, &target.id) {
            ActionOutcome::Ok => {
                self.settle_requirement(turn, job, slot, amount);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Transfer.interaction_range())
            }
            ActionOutcome::NotEnoughResources => self.seek_refill(turn, job, slot),
            ActionOutcome::Full => {
                self.discard(turn, job, slot, "target_full");
                ResultCode::NotModified
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_withdraw(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        match self.act(&turn.unit.id, ActionKind::Withdraw, &target.id) {
            ActionOutcome::Ok | ActionOutcome::Full => {
                self.release(turn, job, slot);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Withdraw.interaction_range())
            }
            ActionOutcome::NotEnoughResources => {
                self.release(turn, job, slot);
                ResultCode::NoContent
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_harvest(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        let gained = self
            .throughput(turn, ActionKind::Harvest)
            .min(target.energy)
            .min(turn.unit.energy_free());
        match self.act(&turn.unit.id, ActionKind::Harvest, &target.id) {
            ActionOutcome::Ok => {
                let room = turn.room();
                self.telemetry
                    .add_energy_gained(&room, ActionKind::Harvest, gained);
                if gained >= turn.unit.energy_free() {
                    self.release(turn, job, slot);
                }
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Harvest.interaction_range())
            }
            ActionOutcome::Full => {
                self.release(turn, job, slot);
                ResultCode::NotModified
            }
            ActionOutcome::NotEnoughResources => {
                self.release(turn, job, slot);
                ResultCode::NoContent
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_build(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        if job.requirement_met() {
            self.discard(turn, job, slot, "requirement_met");
            return ResultCode::NoContent;
        }
        match self.act(&turn.unit.id, ActionKind::Build, &target.id) {
            ActionOutcome::Ok => {
                let throughput = self.throughput(turn, ActionKind::Build);
                let room = turn.room();
                self.telemetry
                    .add_energy_spent(&room, ActionKind::Build, throughput);
                self.settle_requirement(turn, job, slot, throughput);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Build.interaction_range())
            }
            ActionOutcome::NotEnoughResources => self.seek_refill(turn, job, slot),
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_repair(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        if !target.is_damaged() {
            self.discard(turn, job, slot, "target_repaired");
            return ResultCode::NoContent;
        }
        match self.act(&turn.unit.id, ActionKind::Repair, &target.id) {
            ActionOutcome::Ok => {
                let spent = self.throughput(turn, ActionKind::Repair);
                let room = turn.room();
                self.telemetry
                    .add_energy_spent(&room, ActionKind::Repair, spent);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Repair.interaction_range())
            }
            ActionOutcome::NotEnoughResources => self.seek_refill(turn, job, slot),
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_dismantle(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        match self.act(&turn.unit.id, ActionKind::Dismantle, &target.id) {
            ActionOutcome::Ok => {
                let gained = self.throughput(turn, ActionKind::Dismantle);
                let room = turn.room();
                self.telemetry
                    .add_energy_gained(&room, ActionKind::Dismantle, gained);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => self.approach(
                &turn.unit,
                target.position,
                ActionKind::Dismantle.interaction_range(),
            ),
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_upgrade(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        if job.requirement_met() {
            self.discard(turn, job, slot, "requirement_met");
            return ResultCode::NoContent;
        }
        match self.act(&turn.unit.id, ActionKind::Upgrade, &target.id) {
            ActionOutcome::Ok => {
                let throughput = self.throughput(turn, ActionKind::Upgrade);
                let room = turn.room();
                self.telemetry
                    .add_energy_spent(&room, ActionKind::Upgrade, throughput);
                self.settle_requirement(turn, job, slot, throughput);
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Upgrade.interaction_range())
            }
            ActionOutcome::NotEnoughResources => self.seek_refill(turn, job, slot),
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_attack(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        match self.act(&turn.unit.id, ActionKind::Attack, &target.id) {
            ActionOutcome::Ok => ResultCode::Ok,
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Attack.interaction_range())
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_claim(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
    ) -> ResultCode {
        match self.act(&turn.unit.id, ActionKind::Claim, &target.id) {
            ActionOutcome::Ok => {
                self.discard(turn, job, slot, "claimed");
                ResultCode::Ok
            }
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Claim.interaction_range())
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    fn execute_heal(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        target: &EntityView,
        stop_at_max_hits: bool,
    ) -> ResultCode {
        if stop_at_max_hits && !turn.unit.is_damaged() {
            self.discard(turn, job, slot, "healer_at_max_hits");
            return ResultCode::NoContent;
        }
        match self.act(&turn.unit.id, ActionKind::Heal, &target.id) {
            ActionOutcome::Ok => ResultCode::Ok,
            ActionOutcome::NotInRange => {
                self.approach(&turn.unit, target.position, ActionKind::Heal.interaction_range())
            }
            outcome => self.reject(turn, job, slot, outcome),
        }
    }

    /// Lowers the job's remaining requirement and persists it, deleting the job once
    /// nothing is left.
    fn settle_requirement(&mut self, turn: &mut UnitTurn, job: &Job, slot: JobSlot, amount: u32) {
        let room = turn.room();
        let Ok(stored) = self.memory.jobs.job_mut(&room, &job.id) else {
            return;
        };
        if stored.consume_energy(amount) == Some(0) {
            self.discard(turn, job, slot, "requirement_met");
        }
    }

    /// The acting unit ran dry: look for a refill job to hold as secondary, and when
    /// none exists give up the primary job for the role's fallback.
    fn seek_refill(&mut self, turn: &mut UnitTurn, job: &Job, slot: JobSlot) -> ResultCode {
        if slot == JobSlot::Secondary {
            self.release(turn, job, slot);
            return ResultCode::ResourceExhausted;
        }

        let config = self.config;
        let role = turn.memory.role;
        let room = turn.room();
        let refill = self.find_job(
            &room,
            AgentRef::Unit(&turn.unit.id),
            Some(turn.unit.position),
            config.roles.refill_for(role, job.kind()),
            Some(&job.id),
        );
        if let Ok(Assignment::Assigned(secondary)) = refill {
            debug!(
                unit = %turn.unit.id,
                primary = %job.id,
                secondary = %secondary,
                "secondary_job_assigned"
            );
            turn.memory.secondary_job = Some(secondary);
            return ResultCode::ResourceExhausted;
        }

        self.release(turn, job, slot);
        let fallback = self.find_job(
            &room,
            AgentRef::Unit(&turn.unit.id),
            Some(turn.unit.position),
            config.roles.fallback_for(role),
            Some(&job.id),
        );
        if let Ok(Assignment::Assigned(primary)) = fallback {
            debug!(
                unit = %turn.unit.id,
                dropped = %job.id,
                primary = %primary,
                "fallback_job_assigned"
            );
            turn.memory.job = Some(primary);
        }
        ResultCode::ResourceExhausted
    }

    /// Outcomes that end this unit's part in the job.
    fn reject(
        &mut self,
        turn: &mut UnitTurn,
        job: &Job,
        slot: JobSlot,
        outcome: ActionOutcome,
    ) -> ResultCode {
        match outcome {
            ActionOutcome::InvalidTarget => {
                self.discard(turn, job, slot, "invalid_target");
                ResultCode::InvalidTarget
            }
            ActionOutcome::Tired => ResultCode::Ok,
            ActionOutcome::NoBodypart => {
                self.release(turn, job, slot);
                ResultCode::BadRequest
            }
            _ => {
                self.release(turn, job, slot);
                ResultCode::NoContent
            }
        }
    }

    fn release(&mut self, turn: &mut UnitTurn, job: &Job, slot: JobSlot) {
        let room = turn.room();
        self.memory.jobs.unassign_unit(&room, &job.id, &turn.unit.id);
        turn.clear(slot);
    }

    fn discard(&mut self, turn: &mut UnitTurn, job: &Job, slot: JobSlot, reason: &'static str) {
        let room = turn.room();
        self.drop_job(&room, &job.id, reason);
        turn.clear(slot);
    }
}
