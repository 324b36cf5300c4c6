//! Last resort guard against resident memory spikes the pacing loop reacts to too slowly.

use std::{sync::Arc, time::Duration};

use crate::{
    globals::{
        DEFAULT_SAFETY_VALVE_INTERVAL, MAX_MEM_PERCENT, MIN_SAFETY_VALVE_INTERVAL,
        RAM_WARNING_PERCENT,
    },
    pacer::Shared,
    statistics::Counters,
    task_scheduler::PeriodicTask,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SafetyValveConfig {
    /// Resident memory percentage above which a collection is forced.
    pub threshold_percent: f64,
    /// Resident memory percentage above which a warning is logged.
    pub warning_percent: f64,
    /// Sampling interval. Never shorter than [MIN_SAFETY_VALVE_INTERVAL].
    pub interval: Duration,
}

impl SafetyValveConfig {
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_SAFETY_VALVE_INTERVAL)
    }
}

impl Default for SafetyValveConfig {
    fn default() -> Self {
        Self {
            threshold_percent: MAX_MEM_PERCENT,
            warning_percent: RAM_WARNING_PERCENT,
            interval: DEFAULT_SAFETY_VALVE_INTERVAL,
        }
    }
}

pub struct SafetyValve {
    pub(crate) shared: Arc<Shared>,
    pub(crate) config: SafetyValveConfig,
}

impl PeriodicTask for SafetyValve {
    fn name(&self) -> &'static str {
        "safety-valve"
    }

    fn interval(&self) -> Duration {
        self.config.effective_interval()
    }

    fn run(&mut self) {
        check(&self.shared, &self.config);
    }
}

/// Samples resident memory once. Returns `true` if a collection was forced.
pub(crate) fn check(shared: &Shared, config: &SafetyValveConfig) -> bool {
    let percent = shared.runtime.process_memory_percent();
    if percent > config.threshold_percent {
        log::warn!(
            "resident memory at {:.1}% of ceiling (limit {:.1}%), forcing a collection",
            percent,
            config.threshold_percent
        );
        shared.runtime.force_collection();
        Counters::bump(&shared.counters.forced_collections);
        return true;
    }
    if percent > config.warning_percent {
        log::warn!("resident memory at {:.1}% of ceiling", percent);
    }
    false
}
