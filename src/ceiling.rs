//! Memory ceiling resolution.
//!
//! The ceiling is resolved once when a [Pacer](crate::pacer::Pacer) is built. A container limit
//! that does not describe a real positive byte count is treated as "no limit" and the total
//! physical memory is used instead.

use std::io;

use crate::error::{PacerError, Result};

/// Where the memory ceiling comes from.
pub trait MemoryLimitSource {
    /// Raw text of the container memory limit, e.g. the contents of a cgroup limit file.
    fn container_limit_raw(&self) -> io::Result<String>;
    /// Total physical memory of the machine in bytes.
    fn total_memory(&self) -> io::Result<u64>;
}

/// Parses a raw container limit. Returns `None` when the value cannot stand for a real limit:
/// `max`, zero, negative numbers, garbage and values that overflow `u64`.
pub fn parse_limit(raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => None,
        Ok(limit) => Some(limit),
    }
}

/// Resolves the memory ceiling in bytes.
///
/// With `use_container_limit` the result is the smaller of the container limit and total
/// memory. Failing to read the limit source or total memory is fatal.
pub fn resolve_ceiling<S: MemoryLimitSource + ?Sized>(
    source: &S,
    use_container_limit: bool,
) -> Result<u64> {
    let total = source.total_memory().map_err(PacerError::TotalMemory)?;
    if !use_container_limit {
        return Ok(total);
    }

    let raw = source
        .container_limit_raw()
        .map_err(PacerError::LimitSource)?;
    match parse_limit(&raw) {
        Some(limit) => Ok(limit.min(total)),
        None => {
            log::debug!(
                "container memory limit `{}` is not a usable limit, using total memory",
                raw.trim()
            );
            Ok(total)
        }
    }
}
