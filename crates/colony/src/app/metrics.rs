use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct TickMetricsSnapshot {
    pub(crate) tps: f32,
    pub(crate) tick_time_ms: f32,
    pub(crate) slowest_tick_ms: f32,
}

/// Aggregates tick timings over a fixed wall-clock interval.
#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    ticks: u32,
    tick_time_sum: Duration,
    slowest_tick: Duration,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    pub(crate) fn starting_at(start: Instant, interval: Duration) -> Self {
        Self {
            interval_start: start,
            interval,
            ticks: 0,
            tick_time_sum: Duration::ZERO,
            slowest_tick: Duration::ZERO,
        }
    }

    pub(crate) fn record_tick(&mut self, tick_time: Duration) {
        self.ticks = self.ticks.saturating_add(1);
        self.tick_time_sum = self.tick_time_sum.saturating_add(tick_time);
        self.slowest_tick = self.slowest_tick.max(tick_time);
    }

    pub(crate) fn maybe_snapshot(&mut self, now: Instant) -> Option<TickMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let tick_time_ms = if self.ticks == 0 {
            0.0
        } else {
            (self.tick_time_sum.as_secs_f32() / self.ticks as f32) * 1000.0
        };

        let snapshot = TickMetricsSnapshot {
            tps: self.ticks as f32 / elapsed_seconds,
            tick_time_ms,
            slowest_tick_ms: self.slowest_tick.as_secs_f32() * 1000.0,
        };

        self.interval_start = now;
        self.ticks = 0;
        self.tick_time_sum = Duration::ZERO;
        self.slowest_tick = Duration::ZERO;

        Some(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_computes_expected_values() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::starting_at(base, Duration::from_secs(1));

        accumulator.record_tick(Duration::from_millis(4));
        accumulator.record_tick(Duration::from_millis(8));
        accumulator.record_tick(Duration::from_millis(6));
        accumulator.record_tick(Duration::from_millis(6));

        let snapshot = accumulator
            .maybe_snapshot(base + Duration::from_secs(1))
            .expect("snapshot should be emitted");

        assert!((snapshot.tps - 4.0).abs() < 0.05);
        assert!((snapshot.tick_time_ms - 6.0).abs() < 0.001);
        assert!((snapshot.slowest_tick_ms - 8.0).abs() < 0.001);
    }

    #[test]
    fn snapshot_not_emitted_before_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::starting_at(base, Duration::from_secs(1));
        accumulator.record_tick(Duration::from_millis(16));

        assert!(accumulator
            .maybe_snapshot(base + Duration::from_millis(500))
            .is_none());
    }

    #[test]
    fn snapshot_resets_the_interval() {
        let base = Instant::now();
        let mut accumulator = MetricsAccumulator::starting_at(base, Duration::from_secs(1));
        accumulator.record_tick(Duration::from_millis(3));
        let _ = accumulator.maybe_snapshot(base + Duration::from_secs(1));

        let empty = accumulator
            .maybe_snapshot(base + Duration::from_secs(2))
            .expect("second snapshot");
        assert_eq!(empty.tps, 0.0);
        assert_eq!(empty.tick_time_ms, 0.0);
        assert_eq!(empty.slowest_tick_ms, 0.0);
    }
}
