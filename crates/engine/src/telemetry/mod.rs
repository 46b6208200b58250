//! Per-tick instrumentation passed explicitly through the dispatcher.

mod averaging;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use tracing::error;

use crate::codes::{DispatchError, ResultCode};
use crate::jobs::{ActionKind, JobCategory};
use crate::world::RoomName;

pub use averaging::{averaged, AveragedCall, AveragedRoom, AveragedStats, STATS_DIGITS};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub calls: u64,
    pub faults: u64,
    pub elapsed: Duration,
}

impl CallStats {
    fn record(&mut self, elapsed: Duration) {
        self.calls = self.calls.saturating_add(1);
        self.elapsed = self.elapsed.saturating_add(elapsed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomTickStats {
    pub units: u32,
    pub facilities: u32,
    pub jobs: u32,
    pub energy_spent: BTreeMap<ActionKind, u64>,
    pub energy_gained: BTreeMap<ActionKind, u64>,
    pub units_per_job: BTreeMap<JobCategory, u32>,
}

/// Collects one tick worth of counters. Disabled telemetry ignores every record call.
#[derive(Debug, Clone, Default)]
pub struct Telemetry {
    enabled: bool,
    operations: BTreeMap<&'static str, CallStats>,
    intents: BTreeMap<&'static str, CallStats>,
    rooms: BTreeMap<RoomName, RoomTickStats>,
}

impl Telemetry {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_call(&mut self, operation: &'static str, elapsed: Duration) {
        if self.enabled {
            self.operations.entry(operation).or_default().record(elapsed);
        }
    }

    pub fn record_fault(&mut self, operation: &'static str) {
        if self.enabled {
            let stats = self.operations.entry(operation).or_default();
            stats.faults = stats.faults.saturating_add(1);
        }
    }

    pub fn record_intent(&mut self, intent: &'static str, elapsed: Duration) {
        if self.enabled {
            self.intents.entry(intent).or_default().record(elapsed);
        }
    }

    pub fn room_mut(&mut self, room: &RoomName) -> Option<&mut RoomTickStats> {
        if !self.enabled {
            return None;
        }
        Some(self.rooms.entry(room.clone()).or_default())
    }

    pub fn add_energy_spent(&mut self, room: &RoomName, action: ActionKind, amount: u32) {
        if let Some(stats) = self.room_mut(room) {
            *stats.energy_spent.entry(action).or_default() += u64::from(amount);
        }
    }

    pub fn add_energy_gained(&mut self, room: &RoomName, action: ActionKind, amount: u32) {
        if let Some(stats) = self.room_mut(room) {
            *stats.energy_gained.entry(action).or_default() += u64::from(amount);
        }
    }

    pub fn count_unit_on_job(&mut self, room: &RoomName, category: JobCategory) {
        if let Some(stats) = self.room_mut(room) {
            *stats.units_per_job.entry(category).or_default() += 1;
        }
    }

    pub fn operations(&self) -> &BTreeMap<&'static str, CallStats> {
        &self.operations
    }

    pub fn intents(&self) -> &BTreeMap<&'static str, CallStats> {
        &self.intents
    }

    pub fn rooms(&self) -> &BTreeMap<RoomName, RoomTickStats> {
        &self.rooms
    }

    /// Folds this tick into the long-running averages and starts a fresh tick.
    pub fn fold_into(&mut self, stats: &mut AveragedStats, over_ticks: u32) -> ResultCode {
        if !self.enabled {
            return ResultCode::TargetOnDelayOrOff;
        }
        stats.fold(self, over_ticks);
        self.reset();
        ResultCode::Ok
    }

    pub fn reset(&mut self) {
        self.operations.clear();
        self.intents.clear();
        self.rooms.clear();
    }
}

/// Value returned in place of a result when the wrapped body panicked.
pub trait FaultTolerant {
    fn from_fault(operation: &'static str) -> Self;
}

impl FaultTolerant for ResultCode {
    fn from_fault(_operation: &'static str) -> Self {
        ResultCode::InternalError
    }
}

impl<T> FaultTolerant for Result<T, DispatchError> {
    fn from_fault(operation: &'static str) -> Self {
        Err(DispatchError::Internal { operation })
    }
}

/// Wraps calls with timing and a fault boundary. A panic inside `body` is logged with
/// the operation name and its arguments and becomes an internal-error result; it never
/// crosses into the caller.
pub trait Instrumented: Sized {
    fn telemetry_mut(&mut self) -> &mut Telemetry;

    fn instrumented<A, R, F>(&mut self, operation: &'static str, args: A, body: F) -> R
    where
        A: fmt::Debug,
        R: FaultTolerant,
        F: FnOnce(&mut Self) -> R,
    {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *self)));
        let telemetry = self.telemetry_mut();
        telemetry.record_call(operation, started.elapsed());
        match outcome {
            Ok(value) => value,
            Err(payload) => {
                telemetry.record_fault(operation);
                error!(
                    operation,
                    args = ?args,
                    panic = %panic_message(payload.as_ref()),
                    "operation_faulted"
                );
                R::from_fault(operation)
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl Instrumented for Telemetry {
    fn telemetry_mut(&mut self) -> &mut Telemetry {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapper_counts_calls_and_passes_results_through() {
        let mut telemetry = Telemetry::new(true);
        let first = telemetry.instrumented("run_unit", ("u1",), |_| ResultCode::Ok);
        let second = telemetry.instrumented("run_unit", ("u2",), |_| ResultCode::NoContent);

        assert_eq!(first, ResultCode::Ok);
        assert_eq!(second, ResultCode::NoContent);
        let stats = telemetry.operations()["run_unit"];
        assert_eq!(stats.calls, 2);
        assert_eq!(stats.faults, 0);
    }

    #[test]
    fn panic_becomes_internal_error() {
        let mut telemetry = Telemetry::new(true);
        let code: ResultCode = telemetry.instrumented("explode", ("arg",), |_| panic!("boom"));
        assert_eq!(code, ResultCode::InternalError);

        let result: Result<u32, DispatchError> =
            telemetry.instrumented("explode_again", 7u32, |_| panic!("boom"));
        assert_eq!(
            result,
            Err(DispatchError::Internal {
                operation: "explode_again"
            })
        );
        assert_eq!(telemetry.operations()["explode"].faults, 1);
    }

    #[test]
    fn disabled_telemetry_records_nothing_and_declines_folding() {
        let mut telemetry = Telemetry::new(false);
        let room = RoomName::from("W1N1");
        telemetry.record_call("run_room", Duration::from_millis(1));
        telemetry.add_energy_spent(&room, ActionKind::Build, 10);
        assert!(telemetry.operations().is_empty());
        assert!(telemetry.rooms().is_empty());

        let mut stats = AveragedStats::default();
        assert_eq!(
            telemetry.fold_into(&mut stats, 10),
            ResultCode::TargetOnDelayOrOff
        );
        assert_eq!(stats, AveragedStats::default());
    }

    #[test]
    fn folding_resets_the_tick() {
        let mut telemetry = Telemetry::new(true);
        let room = RoomName::from("W1N1");
        telemetry.add_energy_gained(&room, ActionKind::Harvest, 4);
        telemetry.count_unit_on_job(&room, JobCategory::Harvest);

        let mut stats = AveragedStats::default();
        assert_eq!(telemetry.fold_into(&mut stats, 10), ResultCode::Ok);
        assert!(telemetry.rooms().is_empty());
        assert_eq!(stats.ticks_folded, 1);
        assert_eq!(stats.rooms[&room].energy_gained["harvest"], 4.0);
    }
}
