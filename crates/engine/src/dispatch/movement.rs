use std::time::Instant;

use crate::codes::ResultCode;
use crate::jobs::ActionKind;
use crate::world::{ActionOutcome, EntityView, MoveOutcome, ObjectId, Position, World};

use super::Dispatcher;

impl<W: World> Dispatcher<'_, W> {
    /// Issues a single movement intent toward `destination`.
    pub(super) fn approach(
        &mut self,
        agent: &EntityView,
        destination: Position,
        range: u32,
    ) -> ResultCode {
        if agent.facility_kind().is_some() {
            return ResultCode::BadRequest;
        }
        let started = Instant::now();
        let outcome = self.world.move_toward(&agent.id, destination, range);
        self.telemetry.record_intent("move", started.elapsed());
        match outcome {
            MoveOutcome::Moved => ResultCode::Ok,
            MoveOutcome::AlreadyThere => ResultCode::NotModified,
            MoveOutcome::NoPath => ResultCode::NoContent,
        }
    }

    /// Issues a single action intent against `target`.
    pub(super) fn act(
        &mut self,
        agent: &ObjectId,
        kind: ActionKind,
        target: &ObjectId,
    ) -> ActionOutcome {
        let started = Instant::now();
        let outcome = self.world.act(agent, kind, target);
        self.telemetry.record_intent(kind.as_str(), started.elapsed());
        outcome
    }
}
