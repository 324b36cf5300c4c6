//! Tuning parameters and the one-slot mailbox used to hot-reload them.

use crossbeam_utils::atomic::AtomicCell;

use crate::error::{PacerError, Result};

/// Bounds and target for pacing recomputation. Replaced as a whole, never mutated in place.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TuningParameter {
    /// Lowest pacing value that may be applied.
    pub lowest_pacing: i32,
    /// Highest pacing value that may be applied.
    pub highest_pacing: i32,
    /// Desired live heap at next collection divided by the memory ceiling. May be larger than 1.
    pub target_proportion: f64,
    /// Enables per-cycle diagnostics.
    pub verbose: bool,
}

impl TuningParameter {
    pub fn new(
        lowest_pacing: i32,
        highest_pacing: i32,
        target_proportion: f64,
        verbose: bool,
    ) -> Result<Self> {
        let param = Self {
            lowest_pacing,
            highest_pacing,
            target_proportion,
            verbose,
        };
        param.validate()?;
        Ok(param)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lowest_pacing > self.highest_pacing {
            return Err(PacerError::InvalidParameter {
                reason: format!(
                    "lowest pacing {} is above highest pacing {}",
                    self.lowest_pacing, self.highest_pacing
                ),
            });
        }
        if !self.target_proportion.is_finite() || self.target_proportion <= 0.0 {
            return Err(PacerError::InvalidParameter {
                reason: format!(
                    "target proportion must be a positive number, got {}",
                    self.target_proportion
                ),
            });
        }
        Ok(())
    }

    /// Clamps `value` into `[lowest_pacing, highest_pacing]`.
    pub fn clamp(&self, value: i32) -> (i32, Clamp) {
        if value < self.lowest_pacing {
            (self.lowest_pacing, Clamp::Low)
        } else if value > self.highest_pacing {
            (self.highest_pacing, Clamp::High)
        } else {
            (value, Clamp::None)
        }
    }
}

impl Default for TuningParameter {
    fn default() -> Self {
        Self {
            lowest_pacing: 50,
            highest_pacing: 500,
            target_proportion: 0.7,
            verbose: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clamp {
    None,
    Low,
    High,
}

/// Holds the most recently published [TuningParameter].
///
/// Writers replace the whole snapshot and readers always observe a complete one. Concurrent
/// writers are ordered only by "last write wins".
pub struct ParameterStore {
    slot: AtomicCell<Option<TuningParameter>>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self {
            slot: AtomicCell::new(None),
        }
    }

    pub fn put(&self, param: TuningParameter) {
        self.slot.store(Some(param));
    }

    pub fn get(&self) -> Result<TuningParameter> {
        self.slot.load().ok_or(PacerError::MissingParameter)
    }
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}
