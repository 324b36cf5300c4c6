use std::time::{Duration, Instant};

/// Decides whether a finished collection is worth a pacing recomputation.
///
/// Once the heap is assumed stable and the startup grace window is over, recomputation only
/// happens when the last heap reading is older than `max_reading_interval`.
#[derive(Clone, Copy, Debug)]
pub struct RecomputeGate {
    pub heap_assumed_stable: bool,
    pub controller_start: Instant,
    pub startup_grace: Duration,
    pub max_reading_interval: Duration,
}

impl RecomputeGate {
    pub fn should_recompute(&self, last_heap_read: Option<Instant>, now: Instant) -> bool {
        if !self.heap_assumed_stable {
            return true;
        }
        if now.saturating_duration_since(self.controller_start) < self.startup_grace {
            return true;
        }
        match last_heap_read {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.max_reading_interval,
        }
    }
}
