//! The pacing feedback loop.
//!
//! A [Pacer] owns the active tuning state of one collector. Each finished collection runs
//! [Pacer::on_collection_complete], which asks the [RecomputeGate] whether the live heap is
//! worth reading again and, if so, recomputes and applies the pacing value. Parameters
//! published with [Pacer::update_tuning_parameter] reach the active state through the resync
//! task only.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicI32},
        Arc, Weak,
    },
    time::{Duration, Instant},
};

use atomic::{Atomic, Ordering};
use parking_lot::Mutex;

use crate::{
    ceiling::{resolve_ceiling, MemoryLimitSource},
    error::Result,
    gate::RecomputeGate,
    globals::MIB,
    os::SystemMemory,
    pacing::{compute_pacing, PacingStrategy},
    param::{Clamp, ParameterStore, TuningParameter},
    resync::{resync, ResyncTask},
    runtime::{CollectionHook, CollectorRuntime},
    safety_valve::{self, SafetyValve, SafetyValveConfig},
    state::ActiveState,
    statistics::{Counters, PacerStatistics},
    task_scheduler::{PeriodicTask, TaskScheduler},
    PacerConfig,
};

/// State shared between the collection path and the background tasks.
pub(crate) struct Shared {
    pub(crate) runtime: Arc<dyn CollectorRuntime>,
    pub(crate) memory_ceiling: u64,
    pub(crate) store: ParameterStore,
    pub(crate) state: Mutex<ActiveState>,
    pub(crate) gate: RecomputeGate,
    pub(crate) strategy: PacingStrategy,
    pub(crate) counters: Counters,
    published_target: Atomic<f64>,
    published_pacing: AtomicI32,
    stopped: AtomicBool,
}

impl Shared {
    pub(crate) fn publish_target(&self, target_heap_bytes: f64) {
        self.published_target
            .store(target_heap_bytes, Ordering::Release);
    }

    fn on_collection_complete(&self, now: Instant) {
        if self.stopped.load(Ordering::Acquire) {
            return;
        }
        Counters::bump(&self.counters.collections_observed);

        let mut state = self.state.lock();
        if !self.gate.should_recompute(state.last_heap_read, now) {
            Counters::bump(&self.counters.skipped_recomputations);
            return;
        }

        let live_heap_bytes = self.runtime.live_heap_bytes();
        let decision = compute_pacing(
            self.strategy,
            &state.param,
            state.target_heap_bytes,
            live_heap_bytes,
            state.pacing_value,
        );
        match decision.clamp {
            Clamp::High => {
                Counters::bump(&self.counters.high_clamps);
                log::warn!(
                    "the highest pacing value {} seems low for a target of {} MiB",
                    state.param.highest_pacing,
                    state.target_heap_bytes as u64 / MIB
                );
            }
            Clamp::Low => Counters::bump(&self.counters.low_clamps),
            Clamp::None => {}
        }

        self.runtime.set_pacing_value(decision.value);
        state.pacing_value = decision.value;
        state.last_heap_read = Some(now);
        state.last_live_heap_bytes = live_heap_bytes;
        self.published_pacing
            .store(decision.value, Ordering::Release);
        Counters::bump(&self.counters.recomputations);

        logln_if!(state.param.verbose, "heap in use {} MiB", live_heap_bytes / MIB);
        logln_if!(
            state.param.verbose,
            "target heap size {} MiB",
            state.target_heap_bytes as u64 / MIB
        );
        logln_if!(state.param.verbose, "pacing value {}", decision.value);
    }
}

/// Calls back into the pacer on a fixed interval for runtimes that cannot report collections.
/// Cadence becomes time based instead of collection based.
struct IntervalDriver {
    shared: Arc<Shared>,
    interval: Duration,
}

impl PeriodicTask for IntervalDriver {
    fn name(&self) -> &'static str {
        "interval-driver"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run(&mut self) {
        self.shared.on_collection_complete(Instant::now());
    }
}

/// Adaptive pacing controller for one collector.
pub struct Pacer {
    shared: Arc<Shared>,
    scheduler: TaskScheduler,
    safety_valve: Option<SafetyValveConfig>,
}

impl Pacer {
    /// Resolves the memory ceiling, installs `initial` and starts the background tasks.
    ///
    /// Fails if `initial` or `config` is invalid, the ceiling cannot be resolved or a task thread cannot
    /// be spawned.
    pub fn new<R, S>(
        runtime: Arc<R>,
        source: &S,
        config: PacerConfig,
        initial: TuningParameter,
    ) -> Result<Self>
    where
        R: CollectorRuntime,
        S: MemoryLimitSource + ?Sized,
    {
        initial.validate()?;
        config.validate()?;
        let memory_ceiling = resolve_ceiling(source, config.use_container_limit)?;
        let now = Instant::now();
        let state = ActiveState::new(initial, memory_ceiling, now);

        let store = ParameterStore::new();
        store.put(initial);

        let runtime: Arc<dyn CollectorRuntime> = runtime;
        let shared = Arc::new(Shared {
            runtime: runtime.clone(),
            memory_ceiling,
            store,
            gate: RecomputeGate {
                heap_assumed_stable: config.heap_assumed_stable,
                controller_start: now,
                startup_grace: config.startup_grace,
                max_reading_interval: config.max_reading_interval,
            },
            strategy: config.strategy,
            counters: Counters::default(),
            published_target: Atomic::new(state.target_heap_bytes),
            published_pacing: AtomicI32::new(state.pacing_value),
            stopped: AtomicBool::new(false),
            state: Mutex::new(state),
        });

        logln_if!(
            initial.verbose,
            "memory ceiling {} MiB, target heap size {} MiB",
            memory_ceiling / MIB,
            state.target_heap_bytes as u64 / MIB
        );

        let pacer = Self {
            shared: shared.clone(),
            scheduler: TaskScheduler::new(),
            safety_valve: config.safety_valve,
        };

        pacer.scheduler.spawn(ResyncTask {
            shared: shared.clone(),
            interval: config.resync_interval,
        })?;
        if let Some(valve) = config.safety_valve {
            pacer.scheduler.spawn(SafetyValve {
                shared: shared.clone(),
                config: valve,
            })?;
        }
        if !runtime.register_collection_hook(pacer.collection_hook()) {
            if let Some(interval) = config.fallback_interval {
                log::debug!(
                    "runtime cannot report collections, polling every {:?}",
                    interval
                );
                pacer
                    .scheduler
                    .spawn(IntervalDriver { shared, interval })?;
            }
        }
        Ok(pacer)
    }

    /// Builds a pacer against the operating system's memory limits with default intervals.
    pub fn construct<R: CollectorRuntime>(
        runtime: Arc<R>,
        use_container_limit: bool,
        initial: TuningParameter,
        heap_assumed_stable: bool,
        startup_grace_minutes: u64,
    ) -> Result<Self> {
        let config = PacerConfig {
            use_container_limit,
            heap_assumed_stable,
            startup_grace: Duration::from_secs(startup_grace_minutes.saturating_mul(60)),
            ..Default::default()
        };
        Self::new(runtime, &SystemMemory, config, initial)
    }

    /// Publishes `param`. The active state picks it up at the next resync.
    pub fn update_tuning_parameter(&self, param: TuningParameter) -> Result<()> {
        param.validate()?;
        self.shared.store.put(param);
        logln_if!(
            param.verbose,
            "tuning parameter published: pacing [{}, {}], proportion {}",
            param.lowest_pacing,
            param.highest_pacing,
            param.target_proportion
        );
        Ok(())
    }

    /// Runs one pacing step. Call once per finished collection, never concurrently.
    pub fn on_collection_complete(&self) {
        self.shared.on_collection_complete(Instant::now());
    }

    /// Same as [Pacer::on_collection_complete] with an explicit clock reading.
    pub fn on_collection_complete_at(&self, now: Instant) {
        self.shared.on_collection_complete(now);
    }

    /// Hook suitable for [CollectorRuntime::register_collection_hook]. It does not keep the
    /// pacer alive and does nothing once the pacer is stopped or dropped.
    pub fn collection_hook(&self) -> CollectionHook {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.on_collection_complete(Instant::now());
            }
        })
    }

    /// Applies the latest published parameter now instead of waiting for the resync task.
    pub fn resync_now(&self) {
        resync(&self.shared, Instant::now());
    }

    /// Samples resident memory once. `None` when the safety valve is disabled, otherwise
    /// whether a collection was forced.
    pub fn check_safety_valve(&self) -> Option<bool> {
        self.safety_valve
            .as_ref()
            .map(|config| safety_valve::check(&self.shared, config))
    }

    /// Stops background tasks. Later collection notifications are ignored.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Release);
        self.scheduler.shutdown();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }

    pub fn pacing_value(&self) -> i32 {
        self.shared.published_pacing.load(Ordering::Acquire)
    }

    pub fn target_heap_bytes(&self) -> f64 {
        self.shared.published_target.load(Ordering::Acquire)
    }

    pub fn memory_ceiling(&self) -> u64 {
        self.shared.memory_ceiling
    }

    /// Parameter currently driving recomputation, which may lag the last published one.
    pub fn active_parameter(&self) -> TuningParameter {
        self.shared.state.lock().param
    }

    pub fn statistics(&self) -> PacerStatistics {
        let state = *self.shared.state.lock();
        let mut stats = PacerStatistics {
            memory_ceiling: self.shared.memory_ceiling,
            target_heap_bytes: state.target_heap_bytes as u64,
            pacing_value: state.pacing_value,
            last_live_heap_bytes: state.last_live_heap_bytes,
            ..Default::default()
        };
        self.shared.counters.fill(&mut stats);
        stats
    }
}

impl Drop for Pacer {
    fn drop(&mut self) {
        self.stop();
    }
}
