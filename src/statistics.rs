use std::sync::atomic::AtomicU64;

use atomic::Ordering;

/// Snapshot of what a pacer has done so far.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PacerStatistics {
    pub memory_ceiling: u64,
    pub target_heap_bytes: u64,
    pub pacing_value: i32,
    pub last_live_heap_bytes: u64,
    pub collections_observed: u64,
    pub recomputations: u64,
    pub skipped_recomputations: u64,
    pub low_clamps: u64,
    pub high_clamps: u64,
    pub resyncs: u64,
    pub forced_collections: u64,
}

/// Counters bumped from the notification path and the background tasks.
#[derive(Default)]
pub(crate) struct Counters {
    pub collections_observed: AtomicU64,
    pub recomputations: AtomicU64,
    pub skipped_recomputations: AtomicU64,
    pub low_clamps: AtomicU64,
    pub high_clamps: AtomicU64,
    pub resyncs: AtomicU64,
    pub forced_collections: AtomicU64,
}

impl Counters {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fill(&self, stats: &mut PacerStatistics) {
        stats.collections_observed = self.collections_observed.load(Ordering::Relaxed);
        stats.recomputations = self.recomputations.load(Ordering::Relaxed);
        stats.skipped_recomputations = self.skipped_recomputations.load(Ordering::Relaxed);
        stats.low_clamps = self.low_clamps.load(Ordering::Relaxed);
        stats.high_clamps = self.high_clamps.load(Ordering::Relaxed);
        stats.resyncs = self.resyncs.load(Ordering::Relaxed);
        stats.forced_collections = self.forced_collections.load(Ordering::Relaxed);
    }
}

/// Byte count rendered with a binary unit suffix, e.g. `1.5K` or `2.0G`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ByteSize(pub u64);

impl std::fmt::Display for ByteSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const UNITS: [char; 3] = ['K', 'M', 'G'];
        if self.0 < 1024 {
            return write!(f, "{}B", self.0);
        }
        let mut scaled = self.0 as f64 / 1024.0;
        let mut unit = 0;
        while scaled >= 1024.0 && unit + 1 < UNITS.len() {
            scaled /= 1024.0;
            unit += 1;
        }
        write!(f, "{:.1}{}", scaled, UNITS[unit])
    }
}

impl std::fmt::Display for PacerStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Pacer statistics:")?;
        writeln!(
            f,
            "  Memory ceiling: {}",
            ByteSize(self.memory_ceiling)
        )?;
        writeln!(
            f,
            "  Target heap size: {}",
            ByteSize(self.target_heap_bytes)
        )?;
        writeln!(
            f,
            "  Last live heap: {}",
            ByteSize(self.last_live_heap_bytes)
        )?;
        writeln!(f, "  Pacing value: {}%", self.pacing_value)?;
        writeln!(f, "  Collections observed: {}", self.collections_observed)?;
        writeln!(
            f,
            "  Recomputations: {} ({} skipped)",
            self.recomputations, self.skipped_recomputations
        )?;
        writeln!(
            f,
            "  Clamped: {} low, {} high",
            self.low_clamps, self.high_clamps
        )?;
        writeln!(f, "  Parameter resyncs: {}", self.resyncs)?;
        writeln!(f, "  Forced collections: {}", self.forced_collections)?;
        Ok(())
    }
}
