//! Pacing value arithmetic.
//!
//! The pacing value is the percentage the heap may grow over the live heap before the next
//! collection starts. [PacingStrategy::Ratio] solves for the value that lets the heap grow
//! exactly to the target size; [PacingStrategy::Step] nudges the current value toward it.

use crate::{
    globals::{MIN_LIVE_HEAP_BYTES, PACING_STEP},
    param::{Clamp, TuningParameter},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingStrategy {
    /// `round((target / live - 1) * 100)`.
    Ratio,
    /// Moves the previous value by `step`: down while the live heap is above target, up otherwise.
    Step { step: i32 },
}

impl Default for PacingStrategy {
    fn default() -> Self {
        Self::Ratio
    }
}

impl PacingStrategy {
    pub const fn step() -> Self {
        Self::Step { step: PACING_STEP }
    }
}

/// Result of one recomputation, before it is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacingDecision {
    pub value: i32,
    /// Live heap actually used as the divisor.
    pub live_heap_bytes: u64,
    pub clamp: Clamp,
}

/// Raises implausibly small heap readings to [MIN_LIVE_HEAP_BYTES].
#[inline]
pub fn floor_live_heap(live_heap_bytes: u64) -> u64 {
    live_heap_bytes.max(MIN_LIVE_HEAP_BYTES)
}

/// Unclamped ratio-based pacing value. `live_heap_bytes` must be non-zero.
#[inline]
pub fn ratio_pacing(target_heap_bytes: f64, live_heap_bytes: u64) -> i32 {
    // `as` saturates, so an absurd ratio still ends up in the clamp instead of wrapping.
    (((target_heap_bytes / live_heap_bytes as f64) - 1.0) * 100.0).round() as i32
}

pub fn compute_pacing(
    strategy: PacingStrategy,
    param: &TuningParameter,
    target_heap_bytes: f64,
    live_heap_bytes: u64,
    current: i32,
) -> PacingDecision {
    let live = floor_live_heap(live_heap_bytes);
    let raw = match strategy {
        PacingStrategy::Ratio => ratio_pacing(target_heap_bytes, live),
        PacingStrategy::Step { step } => {
            if live as f64 > target_heap_bytes {
                current.saturating_sub(step)
            } else {
                current.saturating_add(step)
            }
        }
    };
    let (value, clamp) = param.clamp(raw);
    PacingDecision {
        value,
        live_heap_bytes: live,
        clamp,
    }
}
