use std::{
    io,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    c_api,
    ceiling::MemoryLimitSource,
    globals::{MIB, MIN_SAFETY_VALVE_INTERVAL},
    CollectionHook, CollectorRuntime, Pacer, PacerConfig, PacerError, PacingStrategy,
    SafetyValveConfig, TuningParameter,
};

struct FakeRuntime {
    live: AtomicU64,
    resident_percent: Mutex<f64>,
    applied: Mutex<Vec<i32>>,
    forced: AtomicUsize,
    hook: Mutex<Option<CollectionHook>>,
    supports_hook: bool,
}

impl FakeRuntime {
    fn new(live: u64, supports_hook: bool) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicU64::new(live),
            resident_percent: Mutex::new(10.0),
            applied: Mutex::new(vec![]),
            forced: AtomicUsize::new(0),
            hook: Mutex::new(None),
            supports_hook,
        })
    }

    fn set_live(&self, live: u64) {
        self.live.store(live, Ordering::SeqCst);
    }

    /// Simulates a finished collection cycle.
    fn collect(&self) {
        if let Some(hook) = self.hook.lock().as_ref() {
            hook();
        }
    }

    fn applied(&self) -> Vec<i32> {
        self.applied.lock().clone()
    }
}

impl CollectorRuntime for FakeRuntime {
    fn live_heap_bytes(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    fn set_pacing_value(&self, percent: i32) {
        self.applied.lock().push(percent);
    }

    fn process_memory_percent(&self) -> f64 {
        *self.resident_percent.lock()
    }

    fn force_collection(&self) {
        self.forced.fetch_add(1, Ordering::SeqCst);
    }

    fn register_collection_hook(&self, hook: CollectionHook) -> bool {
        if !self.supports_hook {
            return false;
        }
        *self.hook.lock() = Some(hook);
        true
    }
}

struct FixedCeiling(u64);

impl MemoryLimitSource for FixedCeiling {
    fn container_limit_raw(&self) -> io::Result<String> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no cgroup"))
    }

    fn total_memory(&self) -> io::Result<u64> {
        Ok(self.0)
    }
}

fn param(lowest: i32, highest: i32, proportion: f64) -> TuningParameter {
    TuningParameter::new(lowest, highest, proportion, true).unwrap()
}

fn manual_config() -> PacerConfig {
    PacerConfig {
        fallback_interval: None,
        ..Default::default()
    }
}

/// Ceiling 2000 MiB at proportion 0.5 gives a 1000 MiB target.
fn pacer_with(
    runtime: &Arc<FakeRuntime>,
    config: PacerConfig,
    initial: TuningParameter,
) -> Pacer {
    Pacer::new(runtime.clone(), &FixedCeiling(2000 * MIB), config, initial).unwrap()
}

#[test]
fn half_full_heap_doubles() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));
    assert_eq!(pacer.target_heap_bytes(), (1000 * MIB) as f64);

    runtime.collect();
    assert_eq!(runtime.applied(), vec![100]);
    assert_eq!(pacer.pacing_value(), 100);
    assert_eq!(pacer.statistics().recomputations, 1);
}

#[test]
fn heap_at_target_clamps_to_lowest() {
    let runtime = FakeRuntime::new(1000 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(20, 1000, 0.5));

    pacer.on_collection_complete();
    assert_eq!(runtime.applied(), vec![20]);
    assert_eq!(pacer.statistics().low_clamps, 1);
}

#[test]
fn starts_at_lowest_without_applying() {
    let runtime = FakeRuntime::new(1000 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(30, 1000, 0.5));
    assert_eq!(pacer.pacing_value(), 30);
    assert!(runtime.applied().is_empty());
}

#[test]
fn tiny_heap_reading_is_floored() {
    let runtime = FakeRuntime::new(MIB, true);
    // 40 MiB * 0.5 = 20 MiB target over a 10 MiB floor.
    let pacer = Pacer::new(
        runtime.clone(),
        &FixedCeiling(40 * MIB),
        manual_config(),
        param(0, 10_000, 0.5),
    )
    .unwrap();

    pacer.on_collection_complete();
    assert_eq!(runtime.applied(), vec![100]);

    runtime.set_live(0);
    pacer.on_collection_complete();
    assert_eq!(runtime.applied(), vec![100, 100]);
}

#[test]
fn stable_heap_skips_fresh_readings() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        heap_assumed_stable: true,
        max_reading_interval: Duration::from_secs(60),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));
    let t0 = Instant::now();

    pacer.on_collection_complete_at(t0);
    assert_eq!(runtime.applied(), vec![100]);

    runtime.set_live(250 * MIB);
    pacer.on_collection_complete_at(t0 + Duration::from_secs(10));
    assert_eq!(runtime.applied(), vec![100]);
    assert_eq!(pacer.pacing_value(), 100);

    pacer.on_collection_complete_at(t0 + Duration::from_secs(61));
    assert_eq!(runtime.applied(), vec![100, 300]);

    let stats = pacer.statistics();
    assert_eq!(stats.collections_observed, 3);
    assert_eq!(stats.skipped_recomputations, 1);
    assert_eq!(stats.recomputations, 2);
}

#[test]
fn startup_grace_recomputes_every_cycle() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        heap_assumed_stable: true,
        startup_grace: Duration::from_secs(3600),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));
    let t0 = Instant::now();

    pacer.on_collection_complete_at(t0);
    pacer.on_collection_complete_at(t0 + Duration::from_millis(1));
    assert_eq!(runtime.applied().len(), 2);
}

#[test]
fn hot_reload_waits_for_resync() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let initial = param(0, 1000, 0.5);
    let pacer = pacer_with(&runtime, manual_config(), initial);

    let reloaded = param(0, 50, 0.5);
    pacer.update_tuning_parameter(reloaded).unwrap();
    assert_eq!(pacer.active_parameter(), initial);

    runtime.collect();
    assert_eq!(runtime.applied(), vec![100]);

    pacer.resync_now();
    assert_eq!(pacer.active_parameter(), reloaded);
    runtime.collect();
    assert_eq!(runtime.applied(), vec![100, 50]);

    let stats = pacer.statistics();
    assert_eq!(stats.high_clamps, 1);
    assert_eq!(stats.resyncs, 1);
}

#[test]
fn resync_recomputes_target_from_new_proportion() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));

    pacer.update_tuning_parameter(param(0, 1000, 1.0)).unwrap();
    assert_eq!(pacer.target_heap_bytes(), (1000 * MIB) as f64);
    pacer.resync_now();
    assert_eq!(pacer.target_heap_bytes(), (2000 * MIB) as f64);

    runtime.collect();
    assert_eq!(runtime.applied(), vec![300]);
}

#[test]
fn resync_task_applies_reload_on_its_own() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        resync_interval: Duration::from_millis(5),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));
    let reloaded = param(0, 50, 0.5);
    pacer.update_tuning_parameter(reloaded).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while pacer.active_parameter() != reloaded && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    assert_eq!(pacer.active_parameter(), reloaded);
}

#[test]
fn invalid_reload_is_rejected() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));
    let inverted = TuningParameter {
        lowest_pacing: 100,
        highest_pacing: 10,
        target_proportion: 0.5,
        verbose: false,
    };
    assert!(matches!(
        pacer.update_tuning_parameter(inverted),
        Err(PacerError::InvalidParameter { .. })
    ));
    pacer.resync_now();
    assert_eq!(pacer.active_parameter(), param(0, 1000, 0.5));
}

#[test]
fn applied_value_stays_in_bounds() {
    let runtime = FakeRuntime::new(MIB, true);
    let _pacer = pacer_with(&runtime, manual_config(), param(-20, 400, 0.5));
    for live_mib in [0, 1, 10, 100, 333, 1000, 5000, 1 << 20] {
        runtime.set_live(live_mib * MIB);
        runtime.collect();
    }
    assert!(runtime
        .applied()
        .iter()
        .all(|&value| (-20..=400).contains(&value)));
}

#[test]
fn step_strategy_walks_toward_target() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        strategy: PacingStrategy::step(),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(50, 1000, 0.5));

    runtime.collect();
    runtime.collect();
    runtime.set_live(1500 * MIB);
    runtime.collect();
    assert_eq!(runtime.applied(), vec![60, 70, 60]);
    drop(pacer);
}

#[test]
fn stop_ignores_later_collections() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));
    pacer.stop();
    assert!(pacer.is_stopped());
    runtime.collect();
    pacer.on_collection_complete();
    assert!(runtime.applied().is_empty());
    pacer.stop();
}

#[test]
fn dropped_pacer_leaves_a_dead_hook() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    drop(pacer_with(&runtime, manual_config(), param(0, 1000, 0.5)));
    runtime.collect();
    assert!(runtime.applied().is_empty());
}

#[test]
fn polls_when_runtime_has_no_hook() {
    let runtime = FakeRuntime::new(500 * MIB, false);
    let config = PacerConfig {
        fallback_interval: Some(Duration::from_millis(5)),
        ..Default::default()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));

    let deadline = Instant::now() + Duration::from_secs(5);
    while runtime.applied().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    pacer.stop();
    assert_eq!(runtime.applied().first(), Some(&100));
}

#[test]
fn safety_valve_forces_collection_above_threshold() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        safety_valve: Some(SafetyValveConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        }),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));

    assert_eq!(pacer.check_safety_valve(), Some(false));
    *runtime.resident_percent.lock() = 90.0;
    assert_eq!(pacer.check_safety_valve(), Some(true));
    assert_eq!(runtime.forced.load(Ordering::SeqCst), 1);
    assert_eq!(pacer.statistics().forced_collections, 1);
    assert!(runtime.applied().is_empty());
    assert_eq!(pacer.pacing_value(), 0);
}

#[test]
fn safety_valve_task_samples_on_its_own() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    *runtime.resident_percent.lock() = 90.0;
    let config = PacerConfig {
        safety_valve: Some(SafetyValveConfig {
            interval: MIN_SAFETY_VALVE_INTERVAL,
            ..Default::default()
        }),
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));

    let deadline = Instant::now() + Duration::from_secs(5);
    while runtime.forced.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    pacer.stop();
    assert!(runtime.forced.load(Ordering::SeqCst) > 0);
    assert!(pacer.statistics().forced_collections > 0);
    assert!(runtime.applied().is_empty());
}

#[test]
fn safety_valve_disabled_by_default() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));
    *runtime.resident_percent.lock() = 99.0;
    assert_eq!(pacer.check_safety_valve(), None);
    assert_eq!(runtime.forced.load(Ordering::SeqCst), 0);
}

#[test]
fn construction_fails_without_limit_source() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        use_container_limit: true,
        ..manual_config()
    };
    let result = Pacer::new(
        runtime,
        &FixedCeiling(2000 * MIB),
        config,
        param(0, 1000, 0.5),
    );
    assert!(matches!(result, Err(PacerError::LimitSource(_))));
}

#[test]
fn construction_rejects_invalid_parameter() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let result = Pacer::new(
        runtime,
        &FixedCeiling(2000 * MIB),
        manual_config(),
        TuningParameter {
            target_proportion: 0.0,
            ..TuningParameter::default()
        },
    );
    assert!(matches!(result, Err(PacerError::InvalidParameter { .. })));
}

#[test]
fn construct_uses_machine_memory() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = Pacer::construct(runtime, false, param(0, 1000, 0.5), true, 1).unwrap();
    assert!(pacer.memory_ceiling() > 0);
    assert_eq!(
        pacer.target_heap_bytes(),
        pacer.memory_ceiling() as f64 * 0.5
    );
}

#[test]
fn statistics_report_renders() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let pacer = pacer_with(&runtime, manual_config(), param(0, 1000, 0.5));
    runtime.collect();
    let report = pacer.statistics().to_string();
    assert!(report.contains("Pacing value: 100%"));
    assert!(report.contains("Memory ceiling: 2.0G"));
}

static C_LIVE: AtomicU64 = AtomicU64::new(500 * MIB);
static C_APPLIED: AtomicU64 = AtomicU64::new(0);

extern "C" fn c_live(_: *mut u8) -> u64 {
    C_LIVE.load(Ordering::SeqCst)
}
extern "C" fn c_set(_: *mut u8, percent: i32) {
    C_APPLIED.store(percent as u64, Ordering::SeqCst);
}
extern "C" fn c_percent(_: *mut u8) -> f64 {
    1.0
}
extern "C" fn c_force(_: *mut u8) {}

#[test]
fn c_api_drives_callbacks() {
    let mut options = c_api::pacer_default_options();
    options.fallback_interval_ms = 0;
    options.safety_valve_percent = 0.0;
    let callbacks = c_api::PacerCallbacks {
        data: std::ptr::null_mut(),
        live_heap_bytes: c_live,
        set_pacing_value: c_set,
        process_memory_percent: c_percent,
        force_collection: c_force,
    };
    let pacer = c_api::pacer_create(callbacks, options, param(0, i32::MAX, 0.5));
    assert!(!pacer.is_null());

    c_api::pacer_on_collection_complete(pacer);
    let applied = C_APPLIED.load(Ordering::SeqCst) as i32;
    assert!(applied >= 0);
    assert_eq!(c_api::pacer_pacing_value(pacer), applied);

    assert!(!c_api::pacer_update_tuning_parameter(
        pacer,
        TuningParameter {
            lowest_pacing: 2,
            highest_pacing: 1,
            ..TuningParameter::default()
        }
    ));
    c_api::pacer_stop(pacer);
    c_api::pacer_free(pacer);
}

#[test]
fn c_api_options_round_trip_defaults() {
    let config: PacerConfig = c_api::pacer_default_options().into();
    let defaults = PacerConfig::default();
    assert_eq!(config.resync_interval, defaults.resync_interval);
    assert_eq!(config.max_reading_interval, defaults.max_reading_interval);
    assert_eq!(config.fallback_interval, defaults.fallback_interval);
    assert_eq!(config.strategy, PacingStrategy::Ratio);
    assert_eq!(config.safety_valve, PacerConfig::default().safety_valve);
    assert_eq!(config.safety_valve, None);
}

#[test]
fn zero_intervals_are_rejected() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let zero_resync = PacerConfig {
        resync_interval: Duration::ZERO,
        ..manual_config()
    };
    let zero_fallback = PacerConfig {
        fallback_interval: Some(Duration::ZERO),
        ..Default::default()
    };
    for config in [zero_resync, zero_fallback] {
        let result = Pacer::new(
            runtime.clone(),
            &FixedCeiling(2000 * MIB),
            config,
            param(0, 1000, 0.5),
        );
        assert!(matches!(result, Err(PacerError::InvalidParameter { .. })));
    }
}

#[test]
fn non_positive_step_is_rejected() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    for step in [0, -10] {
        let config = PacerConfig {
            strategy: PacingStrategy::Step { step },
            ..manual_config()
        };
        let result = Pacer::new(
            runtime.clone(),
            &FixedCeiling(2000 * MIB),
            config,
            param(0, 1000, 0.5),
        );
        assert!(matches!(result, Err(PacerError::InvalidParameter { .. })));
    }
}

#[test]
fn c_api_rejects_zero_resync_interval() {
    let mut options = c_api::pacer_default_options();
    options.fallback_interval_ms = 0;
    options.resync_interval_ms = 0;
    let callbacks = c_api::PacerCallbacks {
        data: std::ptr::null_mut(),
        live_heap_bytes: c_live,
        set_pacing_value: c_set,
        process_memory_percent: c_percent,
        force_collection: c_force,
    };
    let pacer = c_api::pacer_create(callbacks, options, param(0, 1000, 0.5));
    assert!(pacer.is_null());
}

#[test]
fn unbounded_resync_interval_never_fires() {
    let runtime = FakeRuntime::new(500 * MIB, true);
    let config = PacerConfig {
        resync_interval: Duration::MAX,
        ..manual_config()
    };
    let pacer = pacer_with(&runtime, config, param(0, 1000, 0.5));
    pacer.update_tuning_parameter(param(0, 50, 0.5)).unwrap();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(pacer.active_parameter(), param(0, 1000, 0.5));

    pacer.resync_now();
    runtime.collect();
    assert_eq!(runtime.applied(), vec![50]);
    pacer.stop();
    assert_eq!(pacer.statistics().resyncs, 1);
}
