//! Contract between the pacer and the garbage collected runtime it drives.

/// Callback invoked once per completed collection cycle.
pub type CollectionHook = Box<dyn Fn() + Send + Sync + 'static>;

/// Operations the pacer needs from the host collector.
///
/// # Serialization
///
/// Hooks registered through [CollectorRuntime::register_collection_hook] must be invoked at
/// most once at a time. The pacer tolerates concurrent invocations (its state sits behind a
/// mutex) but pacing decisions are only meaningful when they follow collection order.
pub trait CollectorRuntime: Send + Sync + 'static {
    /// Bytes currently reachable on the managed heap.
    fn live_heap_bytes(&self) -> u64;
    /// Sets how many percent over the live heap the heap may grow before the next collection.
    fn set_pacing_value(&self, percent: i32);
    /// Resident memory of the process as a percentage of the memory ceiling.
    fn process_memory_percent(&self) -> f64;
    /// Requests an immediate collection.
    fn force_collection(&self);

    /// Arranges for `hook` to run after every completed collection. Returns `false` when the
    /// runtime cannot report collections, in which case the pacer polls on a fixed interval.
    fn register_collection_hook(&self, hook: CollectionHook) -> bool {
        let _ = hook;
        false
    }
}
