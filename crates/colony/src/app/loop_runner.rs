use std::collections::BTreeMap;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use hive_engine::{
    Dispatcher, Memory, MemoryStore, ResultCode, SnapshotError, Telemetry, World,
};
use serde::Serialize;
use tracing::{error, info, warn};

use super::bootstrap::AppWiring;
use super::metrics::MetricsAccumulator;

#[derive(Debug, Clone)]
pub(crate) struct RunConfig {
    pub(crate) ticks: u64,
    /// Zero runs ticks back to back without pacing.
    pub(crate) target_tps: u32,
    pub(crate) max_ticks_per_frame: u32,
    pub(crate) max_frame_delta: Duration,
    pub(crate) metrics_log_interval: Duration,
    pub(crate) save_every_ticks: u64,
    pub(crate) simulated_slow_tick: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            ticks: 300,
            target_tps: 0,
            max_ticks_per_frame: 5,
            max_frame_delta: Duration::from_millis(250),
            metrics_log_interval: Duration::from_secs(1),
            save_every_ticks: 50,
            simulated_slow_tick: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

/// End-of-run report printed to stdout as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub(crate) struct RunSummary {
    pub(crate) ticks_run: u64,
    pub(crate) final_tick: u64,
    pub(crate) faulted_ticks: u64,
    pub(crate) rooms: usize,
    pub(crate) units: usize,
    pub(crate) facilities: usize,
    pub(crate) jobs: usize,
    pub(crate) jobs_by_category: BTreeMap<String, usize>,
    pub(crate) stats_ticks_folded: u64,
}

impl RunSummary {
    fn record(&mut self, code: ResultCode) {
        self.ticks_run = self.ticks_run.saturating_add(1);
        if !code.is_success() {
            self.faulted_ticks = self.faulted_ticks.saturating_add(1);
        }
    }

    fn finish(&mut self, memory: &Memory, final_tick: u64) {
        self.final_tick = final_tick;
        self.rooms = memory.rooms.len();
        self.units = memory.units.len();
        self.facilities = memory.facilities.len();
        self.jobs_by_category.clear();
        self.jobs = 0;
        for (_, table) in memory.jobs.rooms() {
            for job in table.iter() {
                self.jobs += 1;
                *self
                    .jobs_by_category
                    .entry(job.category().as_str().to_string())
                    .or_default() += 1;
            }
        }
        self.stats_ticks_folded = memory.stats.ticks_folded;
    }
}

pub(crate) fn run(app: AppWiring) -> ExitCode {
    match run_ticks(app) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(text) => {
                println!("{text}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                error!(error = %err, "summary_encode_failed");
                ExitCode::FAILURE
            }
        },
        Err(err) => {
            error!(error = %err, "run_failed");
            ExitCode::FAILURE
        }
    }
}

pub(crate) fn run_ticks(mut app: AppWiring) -> Result<RunSummary, SnapshotError> {
    let mut telemetry = Telemetry::new(app.dispatch.stats_enabled);
    let mut metrics = MetricsAccumulator::new(app.run.metrics_log_interval);
    let mut summary = RunSummary::default();
    let fixed_dt = tick_interval(app.run.target_tps);
    let mut accumulator = Duration::ZERO;
    let mut last_frame = Instant::now();

    info!(
        ticks = app.run.ticks,
        target_tps = app.run.target_tps,
        stats = app.dispatch.stats_enabled,
        "run_started"
    );

    while summary.ticks_run < app.run.ticks {
        let planned = match fixed_dt {
            None => 1,
            Some(fixed_dt) => {
                let now = Instant::now();
                let frame_dt = now
                    .saturating_duration_since(last_frame)
                    .min(app.run.max_frame_delta);
                last_frame = now;
                let plan = plan_tick_steps(
                    accumulator.saturating_add(frame_dt),
                    fixed_dt,
                    app.run.max_ticks_per_frame,
                );
                accumulator = plan.remaining_accumulator;
                if !plan.dropped_backlog.is_zero() {
                    warn!(
                        dropped_ms = plan.dropped_backlog.as_secs_f64() * 1000.0,
                        "tick_backlog_dropped"
                    );
                }
                if plan.ticks_to_run == 0 {
                    thread::sleep(fixed_dt.saturating_sub(accumulator));
                    continue;
                }
                plan.ticks_to_run
            }
        };

        let remaining = app.run.ticks - summary.ticks_run;
        for _ in 0..u64::from(planned).min(remaining) {
            run_one_tick(&mut app, &mut telemetry, &mut summary, &mut metrics)?;
        }
    }

    let final_tick = app.world.tick();
    app.store.save(&app.memory, final_tick)?;
    summary.finish(&app.memory, final_tick);
    info!(
        ticks_run = summary.ticks_run,
        final_tick,
        jobs = summary.jobs,
        faulted_ticks = summary.faulted_ticks,
        "run_finished"
    );
    Ok(summary)
}

fn run_one_tick(
    app: &mut AppWiring,
    telemetry: &mut Telemetry,
    summary: &mut RunSummary,
    metrics: &mut MetricsAccumulator,
) -> Result<(), SnapshotError> {
    let started = Instant::now();
    let code =
        Dispatcher::new(&mut app.world, &mut app.memory, telemetry, &app.dispatch).run_tick();
    summary.record(code);
    if !code.is_success() {
        warn!(tick = app.world.tick(), code = %code, "tick_incomplete");
    }
    if !app.run.simulated_slow_tick.is_zero() {
        thread::sleep(app.run.simulated_slow_tick);
    }

    let tick = app.world.tick();
    if app.run.save_every_ticks > 0 && tick % app.run.save_every_ticks == 0 {
        app.store.save(&app.memory, tick)?;
    }
    app.world.advance_tick();

    metrics.record_tick(started.elapsed());
    if let Some(snapshot) = metrics.maybe_snapshot(Instant::now()) {
        info!(
            tps = snapshot.tps,
            tick_time_ms = snapshot.tick_time_ms,
            slowest_tick_ms = snapshot.slowest_tick_ms,
            "loop_metrics"
        );
    }
    Ok(())
}

fn tick_interval(target_tps: u32) -> Option<Duration> {
    (target_tps > 0).then(|| Duration::from_secs_f64(1.0 / f64::from(target_tps)))
}

fn plan_tick_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    if accumulator >= fixed_dt {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: accumulator,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: accumulator,
            dropped_backlog: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use hive_engine::{DispatchConfig, SnapshotStore};
    use tempfile::TempDir;

    use super::*;
    use crate::app::scenario;

    fn wiring(state_dir: &std::path::Path, ticks: u64) -> AppWiring {
        AppWiring {
            run: RunConfig {
                ticks,
                ..RunConfig::default()
            },
            dispatch: DispatchConfig::default(),
            world: scenario::seed_world(),
            memory: Memory::default(),
            store: SnapshotStore::new(state_dir),
        }
    }

    #[test]
    fn plan_tick_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(16);
        let result = plan_tick_steps(Duration::from_millis(48), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 3);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_tick_steps_caps_and_drops_backlog() {
        let fixed_dt = Duration::from_millis(10);
        let result = plan_tick_steps(Duration::from_millis(75), fixed_dt, 5);

        assert_eq!(result.ticks_to_run, 5);
        assert_eq!(result.remaining_accumulator, Duration::ZERO);
        assert_eq!(result.dropped_backlog, Duration::from_millis(25));
    }

    #[test]
    fn unpaced_tick_interval_is_none() {
        assert_eq!(tick_interval(0), None);
        assert_eq!(tick_interval(4), Some(Duration::from_millis(250)));
    }

    #[test]
    fn run_executes_requested_ticks_and_saves_memory() {
        let temp = TempDir::new().expect("tempdir");
        let summary = run_ticks(wiring(temp.path(), 20)).expect("run");

        assert_eq!(summary.ticks_run, 20);
        assert_eq!(summary.final_tick, 20);
        assert_eq!(summary.faulted_ticks, 0);
        assert_eq!(summary.rooms, 2);
        assert!(summary.jobs > 0);
        assert_eq!(summary.stats_ticks_folded, 20);

        let mut store = SnapshotStore::new(temp.path());
        assert_eq!(store.saved_tick(), Some(20));
        let restored = store.load().expect("load");
        assert_eq!(restored.rooms.len(), 2);
    }

    #[test]
    fn memory_survives_a_restart() {
        let temp = TempDir::new().expect("tempdir");
        run_ticks(wiring(temp.path(), 5)).expect("first run");

        let mut resumed = wiring(temp.path(), 5);
        resumed.memory = SnapshotStore::new(temp.path()).load().expect("load");
        let units_before = resumed.memory.units.len();
        let summary = run_ticks(resumed).expect("second run");

        assert!(units_before > 0);
        assert_eq!(summary.units, units_before);
        assert_eq!(summary.stats_ticks_folded, 10);
    }
}
