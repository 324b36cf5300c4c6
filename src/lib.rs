//! # heap-pacer
//!
//! Adaptive pacing for garbage collected runtimes. Instead of running a collector with one
//! static heap growth percentage, a [Pacer](pacer::Pacer) recomputes it after collections so
//! that the heap at the next collection lands near `ceiling * target_proportion`, where the
//! ceiling is the container memory limit or the machine's physical memory.
//!
//! The host runtime is reached through [CollectorRuntime](runtime::CollectorRuntime): it
//! reports the live heap, accepts the pacing value and optionally notifies the pacer after
//! each collection. Tuning parameters can be replaced at runtime and take effect at the next
//! resync.

use std::time::Duration;

macro_rules! logln_if {
    ($cond: expr, $($t:tt)*) => {
        if $cond {
            log::info!($($t)*);
        }
    };
}

pub mod ceiling;
pub mod error;
pub mod gate;
pub mod globals;
pub mod os;
pub mod pacer;
pub mod pacing;
pub mod param;
pub mod resync;
pub mod runtime;
pub mod safety_valve;
pub mod state;
pub mod statistics;
pub mod task_scheduler;

#[cfg(test)]
mod tests;

pub use error::{PacerError, Result};
pub use pacer::Pacer;
pub use pacing::PacingStrategy;
pub use param::TuningParameter;
pub use runtime::{CollectionHook, CollectorRuntime};
pub use safety_valve::SafetyValveConfig;

use globals::{DEFAULT_FALLBACK_INTERVAL, DEFAULT_MAX_READING_INTERVAL, DEFAULT_RESYNC_INTERVAL};

/// Configuration for pacer constructor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PacerConfig {
    /// Take the container memory limit into account when resolving the ceiling
    pub use_container_limit: bool,
    /// Once set, recomputation is skipped while the last heap reading is fresh
    pub heap_assumed_stable: bool,
    /// Recompute on every collection during this window after construction
    pub startup_grace: Duration,
    /// Maximum age of a heap reading once the heap is assumed stable
    pub max_reading_interval: Duration,
    /// How often published tuning parameters are applied
    pub resync_interval: Duration,
    pub strategy: PacingStrategy,
    /// Force collections above a resident memory threshold. Disabled when `None`
    pub safety_valve: Option<SafetyValveConfig>,
    /// Poll interval used when the runtime cannot report collections. With `None` the host
    /// has to call [Pacer::on_collection_complete] itself
    pub fallback_interval: Option<Duration>,
}

impl PacerConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| {
            Err(PacerError::InvalidParameter {
                reason: reason.to_string(),
            })
        };
        if self.resync_interval.is_zero() {
            return invalid("resync interval must be positive");
        }
        if self.fallback_interval.map_or(false, |interval| interval.is_zero()) {
            return invalid("fallback interval must be positive");
        }
        if let PacingStrategy::Step { step } = self.strategy {
            if step <= 0 {
                return invalid("pacing step must be positive");
            }
        }
        Ok(())
    }
}

impl Default for PacerConfig {
    fn default() -> Self {
        Self {
            use_container_limit: false,
            heap_assumed_stable: false,
            startup_grace: Duration::ZERO,
            max_reading_interval: DEFAULT_MAX_READING_INTERVAL,
            resync_interval: DEFAULT_RESYNC_INTERVAL,
            strategy: PacingStrategy::Ratio,
            safety_valve: None,
            fallback_interval: Some(DEFAULT_FALLBACK_INTERVAL),
        }
    }
}

pub mod c_api {
    use std::{ptr::null_mut, sync::Arc, time::Duration};

    use crate::{
        globals::RAM_WARNING_PERCENT,
        os::SystemMemory,
        runtime::CollectorRuntime,
        Pacer, PacerConfig, PacingStrategy, SafetyValveConfig, TuningParameter,
    };

    /// Runtime callbacks. Every callback receives `data` as first argument.
    #[repr(C)]
    pub struct PacerCallbacks {
        pub data: *mut u8,
        pub live_heap_bytes: extern "C" fn(*mut u8) -> u64,
        pub set_pacing_value: extern "C" fn(*mut u8, i32),
        pub process_memory_percent: extern "C" fn(*mut u8) -> f64,
        pub force_collection: extern "C" fn(*mut u8),
    }

    // The caller promises `data` may be used from the pacer's background threads.
    unsafe impl Send for PacerCallbacks {}
    unsafe impl Sync for PacerCallbacks {}

    impl CollectorRuntime for PacerCallbacks {
        fn live_heap_bytes(&self) -> u64 {
            (self.live_heap_bytes)(self.data)
        }
        fn set_pacing_value(&self, percent: i32) {
            (self.set_pacing_value)(self.data, percent)
        }
        fn process_memory_percent(&self) -> f64 {
            (self.process_memory_percent)(self.data)
        }
        fn force_collection(&self) {
            (self.force_collection)(self.data)
        }
    }

    /// Flat version of [PacerConfig]. Durations are milliseconds.
    #[repr(C)]
    #[derive(Clone, Copy, Debug)]
    pub struct PacerOptions {
        pub use_container_limit: bool,
        pub heap_assumed_stable: bool,
        pub startup_grace_ms: u64,
        pub max_reading_interval_ms: u64,
        pub resync_interval_ms: u64,
        /// `0` selects the ratio strategy, anything else the step strategy with this step
        pub pacing_step: i32,
        /// `0` or less disables the safety valve, which is the default
        pub safety_valve_percent: f64,
        pub safety_valve_interval_ms: u64,
        /// `0` disables polling; the host calls `pacer_on_collection_complete` itself
        pub fallback_interval_ms: u64,
    }

    impl From<PacerOptions> for PacerConfig {
        fn from(options: PacerOptions) -> Self {
            let ms = Duration::from_millis;
            Self {
                use_container_limit: options.use_container_limit,
                heap_assumed_stable: options.heap_assumed_stable,
                startup_grace: ms(options.startup_grace_ms),
                max_reading_interval: ms(options.max_reading_interval_ms),
                resync_interval: ms(options.resync_interval_ms),
                strategy: if options.pacing_step == 0 {
                    PacingStrategy::Ratio
                } else {
                    PacingStrategy::Step {
                        step: options.pacing_step,
                    }
                },
                safety_valve: if options.safety_valve_percent > 0.0 {
                    Some(SafetyValveConfig {
                        threshold_percent: options.safety_valve_percent,
                        warning_percent: RAM_WARNING_PERCENT.min(options.safety_valve_percent),
                        interval: ms(options.safety_valve_interval_ms),
                    })
                } else {
                    None
                },
                fallback_interval: if options.fallback_interval_ms == 0 {
                    None
                } else {
                    Some(ms(options.fallback_interval_ms))
                },
            }
        }
    }

    #[no_mangle]
    pub extern "C" fn pacer_default_options() -> PacerOptions {
        let config = PacerConfig::default();
        let valve = SafetyValveConfig::default();
        PacerOptions {
            use_container_limit: config.use_container_limit,
            heap_assumed_stable: config.heap_assumed_stable,
            startup_grace_ms: config.startup_grace.as_millis() as u64,
            max_reading_interval_ms: config.max_reading_interval.as_millis() as u64,
            resync_interval_ms: config.resync_interval.as_millis() as u64,
            pacing_step: 0,
            safety_valve_percent: 0.0,
            safety_valve_interval_ms: valve.interval.as_millis() as u64,
            fallback_interval_ms: config
                .fallback_interval
                .map_or(0, |interval| interval.as_millis() as u64),
        }
    }

    /// Creates a pacer. NULL is returned if the ceiling cannot be resolved or `param` is invalid.
    #[no_mangle]
    pub extern "C" fn pacer_create(
        callbacks: PacerCallbacks,
        options: PacerOptions,
        param: TuningParameter,
    ) -> *mut Pacer {
        match Pacer::new(Arc::new(callbacks), &SystemMemory, options.into(), param) {
            Ok(pacer) => Box::into_raw(Box::new(pacer)),
            Err(err) => {
                log::error!("failed to create pacer: {}", err);
                null_mut()
            }
        }
    }

    /// Publishes a new tuning parameter. Returns false if it is invalid.
    #[no_mangle]
    pub extern "C" fn pacer_update_tuning_parameter(
        pacer: *mut Pacer,
        param: TuningParameter,
    ) -> bool {
        unsafe { (*pacer).update_tuning_parameter(param).is_ok() }
    }

    #[no_mangle]
    pub extern "C" fn pacer_on_collection_complete(pacer: *mut Pacer) {
        unsafe {
            (*pacer).on_collection_complete();
        }
    }

    #[no_mangle]
    pub extern "C" fn pacer_pacing_value(pacer: *mut Pacer) -> i32 {
        unsafe { (*pacer).pacing_value() }
    }

    #[no_mangle]
    pub extern "C" fn pacer_stop(pacer: *mut Pacer) {
        unsafe {
            (*pacer).stop();
        }
    }

    /// Stops and frees the pacer.
    #[no_mangle]
    pub extern "C" fn pacer_free(pacer: *mut Pacer) {
        if pacer.is_null() {
            return;
        }
        unsafe {
            drop(Box::from_raw(pacer));
        }
    }
}
