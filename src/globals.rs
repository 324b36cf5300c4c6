use std::time::Duration;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * KIB;
/// Live heap readings below this are treated as this value so the pacing ratio never divides by ~0.
pub const MIN_LIVE_HEAP_BYTES: u64 = 10 * MIB;
pub const DEFAULT_RESYNC_INTERVAL: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_MAX_READING_INTERVAL: Duration = Duration::from_secs(60);
/// Tick of the interval driver used when the runtime cannot report finished collections.
pub const DEFAULT_FALLBACK_INTERVAL: Duration = Duration::from_millis(200);
pub const DEFAULT_SAFETY_VALVE_INTERVAL: Duration = Duration::from_secs(1);
pub const MIN_SAFETY_VALVE_INTERVAL: Duration = Duration::from_millis(200);
/// Resident memory percentage that forces a collection.
pub const MAX_MEM_PERCENT: f64 = 85.0;
/// Resident memory percentage that is only reported.
pub const RAM_WARNING_PERCENT: f64 = 80.0;
pub const PACING_STEP: i32 = 10;
pub const CGROUP_V1_MEM_LIMIT_PATH: &str = "/sys/fs/cgroup/memory/memory.limit_in_bytes";
pub const CGROUP_V2_MEM_LIMIT_PATH: &str = "/sys/fs/cgroup/memory.max";
