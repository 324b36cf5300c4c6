use std::time::Instant;

use crate::param::TuningParameter;

/// Values actually driving recomputation.
///
/// Written by the resync task (`param`, `target_heap_bytes`, `last_param_sync`) and by the
/// collection path (`pacing_value`, `last_heap_read`, `last_live_heap_bytes`).
#[derive(Clone, Copy, Debug)]
pub struct ActiveState {
    pub param: TuningParameter,
    pub pacing_value: i32,
    pub target_heap_bytes: f64,
    pub last_param_sync: Instant,
    pub last_heap_read: Option<Instant>,
    pub last_live_heap_bytes: u64,
}

impl ActiveState {
    pub fn new(param: TuningParameter, memory_ceiling: u64, now: Instant) -> Self {
        Self {
            param,
            pacing_value: param.lowest_pacing,
            target_heap_bytes: target_heap_bytes(memory_ceiling, &param),
            last_param_sync: now,
            last_heap_read: None,
            last_live_heap_bytes: 0,
        }
    }

    /// Installs `param` and recomputes the absolute target from it.
    pub fn sync_param(&mut self, param: TuningParameter, memory_ceiling: u64, now: Instant) {
        self.param = param;
        self.target_heap_bytes = target_heap_bytes(memory_ceiling, &param);
        self.last_param_sync = now;
    }
}

#[inline]
pub fn target_heap_bytes(memory_ceiling: u64, param: &TuningParameter) -> f64 {
    memory_ceiling as f64 * param.target_proportion
}
