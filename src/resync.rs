use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    pacer::Shared,
    statistics::{ByteSize, Counters},
    task_scheduler::PeriodicTask,
};

/// Copies the latest published parameter into the active state on a fixed cadence, so a
/// hot reload takes effect at most one interval after it was published.
pub struct ResyncTask {
    pub(crate) shared: Arc<Shared>,
    pub(crate) interval: Duration,
}

impl PeriodicTask for ResyncTask {
    fn name(&self) -> &'static str {
        "resync"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self) {
        resync(&self.shared, Instant::now());
    }
}

pub(crate) fn resync(shared: &Shared, now: Instant) {
    let param = match shared.store.get() {
        Ok(param) => param,
        Err(err) => {
            log::warn!("keeping active tuning parameter: {}", err);
            return;
        }
    };
    let mut state = shared.state.lock();
    state.sync_param(param, shared.memory_ceiling, now);
    shared.publish_target(state.target_heap_bytes);
    Counters::bump(&shared.counters.resyncs);
    logln_if!(
        param.verbose,
        "tuning parameter synced: pacing [{}, {}], target heap {}",
        param.lowest_pacing,
        param.highest_pacing,
        ByteSize(state.target_heap_bytes as u64)
    );
}
