use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{CallStats, Telemetry};
use crate::world::RoomName;

/// Decimal places kept in persisted averages.
pub const STATS_DIGITS: i32 = 6;

/// Exponential moving average over roughly `over_ticks` samples.
pub fn averaged(current: f64, sample: f64, over_ticks: u32) -> f64 {
    if over_ticks <= 1 {
        return sample;
    }
    let n = f64::from(over_ticks);
    round(current * (1.0 - 1.0 / n) + sample / n)
}

fn round(value: f64) -> f64 {
    let scale = 10f64.powi(STATS_DIGITS);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedCall {
    pub calls: f64,
    pub elapsed_ms: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedRoom {
    pub units: f64,
    pub facilities: f64,
    pub jobs: f64,
    #[serde(default)]
    pub energy_spent: BTreeMap<String, f64>,
    #[serde(default)]
    pub energy_gained: BTreeMap<String, f64>,
    #[serde(default)]
    pub units_per_job: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragedStats {
    pub ticks_folded: u64,
    #[serde(default)]
    pub operations: BTreeMap<String, AveragedCall>,
    #[serde(default)]
    pub intents: BTreeMap<String, AveragedCall>,
    #[serde(default)]
    pub rooms: BTreeMap<RoomName, AveragedRoom>,
}

impl AveragedStats {
    /// Keys missing from this tick decay toward zero; the first fold takes samples as-is.
    pub(super) fn fold(&mut self, tick: &Telemetry, over_ticks: u32) {
        let over = if self.ticks_folded == 0 { 1 } else { over_ticks };

        fold_calls(&mut self.operations, tick.operations(), over);
        fold_calls(&mut self.intents, tick.intents(), over);

        for room in tick.rooms().keys() {
            self.rooms.entry(room.clone()).or_default();
        }
        for (name, room) in &mut self.rooms {
            let sample = tick.rooms().get(name).cloned().unwrap_or_default();
            room.units = averaged(room.units, f64::from(sample.units), over);
            room.facilities = averaged(room.facilities, f64::from(sample.facilities), over);
            room.jobs = averaged(room.jobs, f64::from(sample.jobs), over);
            fold_map(
                &mut room.energy_spent,
                sample
                    .energy_spent
                    .iter()
                    .map(|(kind, amount)| (kind.as_str().to_string(), *amount as f64)),
                over,
            );
            fold_map(
                &mut room.energy_gained,
                sample
                    .energy_gained
                    .iter()
                    .map(|(kind, amount)| (kind.as_str().to_string(), *amount as f64)),
                over,
            );
            fold_map(
                &mut room.units_per_job,
                sample
                    .units_per_job
                    .iter()
                    .map(|(category, count)| (category.as_str().to_string(), f64::from(*count))),
                over,
            );
        }

        self.ticks_folded = self.ticks_folded.saturating_add(1);
    }
}

fn fold_calls(
    averages: &mut BTreeMap<String, AveragedCall>,
    sample: &BTreeMap<&'static str, CallStats>,
    over: u32,
) {
    for name in sample.keys() {
        averages.entry((*name).to_string()).or_default();
    }
    for (name, average) in averages.iter_mut() {
        let stats = sample.get(name.as_str()).copied().unwrap_or_default();
        average.calls = averaged(average.calls, stats.calls as f64, over);
        average.elapsed_ms = averaged(average.elapsed_ms, duration_to_ms(stats.elapsed), over);
    }
}

fn fold_map(
    averages: &mut BTreeMap<String, f64>,
    sample: impl Iterator<Item = (String, f64)>,
    over: u32,
) {
    let sample: BTreeMap<String, f64> = sample.collect();
    for key in sample.keys() {
        averages.entry(key.clone()).or_default();
    }
    for (key, average) in averages.iter_mut() {
        *average = averaged(*average, sample.get(key).copied().unwrap_or(0.0), over);
    }
}

fn duration_to_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::ActionKind;

    #[test]
    fn moving_average_weights_new_sample_by_one_over_n() {
        assert_eq!(averaged(100.0, 200.0, 1), 200.0);
        assert_eq!(averaged(100.0, 200.0, 4), 125.0);
        assert_eq!(averaged(0.0, 1.0, 3), 0.333333);
    }

    #[test]
    fn absent_keys_decay_toward_zero() {
        let room = RoomName::from("W1N1");
        let mut stats = AveragedStats::default();

        let mut tick = Telemetry::new(true);
        tick.add_energy_spent(&room, ActionKind::Build, 10);
        tick.record_call("run_room", Duration::from_millis(2));
        stats.fold(&tick, 2);
        assert_eq!(stats.rooms[&room].energy_spent["build"], 10.0);
        assert_eq!(stats.operations["run_room"].calls, 1.0);

        let empty = Telemetry::new(true);
        stats.fold(&empty, 2);
        assert_eq!(stats.rooms[&room].energy_spent["build"], 5.0);
        assert_eq!(stats.operations["run_room"].calls, 0.5);
        assert_eq!(stats.ticks_folded, 2);
    }
}
