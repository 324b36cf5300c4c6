//! Operating system memory queries: container limits, physical memory and resident set size.

use std::io;

use crate::ceiling::MemoryLimitSource;

#[cfg(unix)]
pub use _unix::*;
#[cfg(windows)]
pub use _win::*;

/// [MemoryLimitSource] backed by the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemMemory;

impl MemoryLimitSource for SystemMemory {
    fn container_limit_raw(&self) -> io::Result<String> {
        container_limit_raw()
    }

    fn total_memory(&self) -> io::Result<u64> {
        total_memory()
    }
}

/// Resident memory of this process as a percentage of `ceiling` bytes.
pub fn resident_percent_of(ceiling: u64) -> io::Result<f64> {
    if ceiling == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "memory ceiling is zero",
        ));
    }
    Ok(resident_bytes()? as f64 / ceiling as f64 * 100.0)
}

#[cfg(unix)]
pub mod _unix {
    use std::io;

    use crate::globals::{CGROUP_V1_MEM_LIMIT_PATH, CGROUP_V2_MEM_LIMIT_PATH};

    pub fn page_size() -> io::Result<u64> {
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if size <= 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(size as u64)
    }

    pub fn total_memory() -> io::Result<u64> {
        let pages = unsafe { libc::sysconf(libc::_SC_PHYS_PAGES) };
        if pages <= 0 {
            return Err(io::Error::last_os_error());
        }
        Ok((pages as u64).saturating_mul(page_size()?))
    }

    /// Reads the cgroup v1 limit file, falling back to the cgroup v2 one.
    pub fn container_limit_raw() -> io::Result<String> {
        std::fs::read_to_string(CGROUP_V1_MEM_LIMIT_PATH)
            .or_else(|_| std::fs::read_to_string(CGROUP_V2_MEM_LIMIT_PATH))
    }

    #[cfg(target_os = "linux")]
    pub fn resident_bytes() -> io::Result<u64> {
        let statm = std::fs::read_to_string("/proc/self/statm")?;
        let pages = statm
            .split_whitespace()
            .nth(1)
            .and_then(|field| field.parse::<u64>().ok())
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "malformed /proc/self/statm")
            })?;
        Ok(pages.saturating_mul(page_size()?))
    }

    /// Peak resident set size; the closest figure `getrusage` offers outside of linux.
    #[cfg(not(target_os = "linux"))]
    pub fn resident_bytes() -> io::Result<u64> {
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
        if unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) } != 0 {
            return Err(io::Error::last_os_error());
        }
        let rss = usage.ru_maxrss.max(0) as u64;
        if cfg!(target_os = "macos") {
            Ok(rss)
        } else {
            Ok(rss * 1024)
        }
    }
}

#[cfg(windows)]
pub mod _win {
    use std::{io, mem::size_of};

    use winapi::um::{
        processthreadsapi::GetCurrentProcess,
        psapi::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS},
        sysinfoapi::{GlobalMemoryStatusEx, MEMORYSTATUSEX},
    };

    pub fn total_memory() -> io::Result<u64> {
        unsafe {
            let mut status: MEMORYSTATUSEX = std::mem::zeroed();
            status.dwLength = size_of::<MEMORYSTATUSEX>() as u32;
            if GlobalMemoryStatusEx(&mut status) == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(status.ullTotalPhys)
        }
    }

    pub fn container_limit_raw() -> io::Result<String> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "container memory limits are not available on windows",
        ))
    }

    pub fn resident_bytes() -> io::Result<u64> {
        unsafe {
            let mut counters: PROCESS_MEMORY_COUNTERS = std::mem::zeroed();
            let size = size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
            if GetProcessMemoryInfo(GetCurrentProcess(), &mut counters, size) == 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(counters.WorkingSetSize as u64)
        }
    }
}
