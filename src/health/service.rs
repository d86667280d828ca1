//! Memory and filesystem usage probes. Grounded on the teacher's structured,
//! non-string probe-failure enums (`health_service.h`'s
//! `CheckMemoryAndStorageUsage` / `GetFileSystemStorageUsagePercentage`);
//! spec §4.11 names the exact variants below.

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthProbeError {
    #[error("could not open /proc/meminfo")]
    CouldNotOpenMeminfoFile,
    #[error("meminfo is missing MemTotal or MemAvailable")]
    CouldNotFindMemoryInfo,
    #[error("meminfo line could not be parsed as a number")]
    CouldNotParseMeminfoLine,
    #[error("filesystem capacity or available space reported as zero")]
    InvalidReadFileSystemInfo,
    #[error("memory usage exceeds the 95% threshold")]
    MemoryUsageTooHigh,
    #[error("filesystem usage exceeds the 95% threshold")]
    FilesystemUsageTooHigh,
}

/// Usage threshold above which a probe fails (spec §4.11: "Memory usage
/// ≤ 95%", "Filesystem usage ≤ 95%").
const USAGE_THRESHOLD: f64 = 0.95;

#[derive(Debug, Clone)]
pub struct HealthConfig {
    pub check_memory: bool,
    pub check_filesystem: bool,
    pub filesystem_directory: String,
    pub meminfo_path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_memory: true,
            check_filesystem: true,
            filesystem_directory: "/".to_string(),
            meminfo_path: "/proc/meminfo".to_string(),
        }
    }
}

/// Backing for `GET /health/check`. Each probe is independently toggleable;
/// a disabled probe always passes and is not evaluated (spec §4.11).
pub struct HealthService {
    config: HealthConfig,
}

impl HealthService {
    pub fn new(config: HealthConfig) -> Self {
        Self { config }
    }

    /// Returns `Ok(())` iff every enabled probe passes.
    pub fn check(&self) -> Result<(), HealthProbeError> {
        if self.config.check_memory {
            let usage = self.memory_usage_fraction()?;
            if usage > USAGE_THRESHOLD {
                return Err(HealthProbeError::MemoryUsageTooHigh);
            }
        }
        if self.config.check_filesystem {
            let usage = self.filesystem_usage_fraction()?;
            if usage > USAGE_THRESHOLD {
                return Err(HealthProbeError::FilesystemUsageTooHigh);
            }
        }
        Ok(())
    }

    fn memory_usage_fraction(&self) -> Result<f64, HealthProbeError> {
        let contents = fs::read_to_string(&self.config.meminfo_path)
            .map_err(|_| HealthProbeError::CouldNotOpenMeminfoFile)?;
        Self::parse_meminfo(&contents)
    }

    fn parse_meminfo(contents: &str) -> Result<f64, HealthProbeError> {
        let mut total_kb: Option<u64> = None;
        let mut available_kb: Option<u64> = None;
        for line in contents.lines() {
            if let Some(rest) = line.strip_prefix("MemTotal:") {
                total_kb = Some(parse_meminfo_value(rest)?);
            } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
                available_kb = Some(parse_meminfo_value(rest)?);
            }
        }
        let (total, available) = match (total_kb, available_kb) {
            (Some(t), Some(a)) => (t, a),
            _ => return Err(HealthProbeError::CouldNotFindMemoryInfo),
        };
        if total == 0 {
            return Err(HealthProbeError::CouldNotFindMemoryInfo);
        }
        Ok((total.saturating_sub(available)) as f64 / total as f64)
    }

    fn filesystem_usage_fraction(&self) -> Result<f64, HealthProbeError> {
        let (capacity, available) =
            filesystem_space_info(Path::new(&self.config.filesystem_directory))?;
        if capacity == 0 || available == 0 {
            return Err(HealthProbeError::InvalidReadFileSystemInfo);
        }
        Ok((capacity.saturating_sub(available)) as f64 / capacity as f64)
    }
}

fn parse_meminfo_value(rest: &str) -> Result<u64, HealthProbeError> {
    rest.trim()
        .trim_end_matches(" kB")
        .trim()
        .parse::<u64>()
        .map_err(|_| HealthProbeError::CouldNotParseMeminfoLine)
}

#[cfg(unix)]
fn filesystem_space_info(directory: &Path) -> Result<(u64, u64), HealthProbeError> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(directory.as_os_str().as_bytes())
        .map_err(|_| HealthProbeError::InvalidReadFileSystemInfo)?;
    // SAFETY: `c_path` is a valid NUL-terminated C string for the duration
    // of this call, and `stat` is fully initialized by a successful
    // `statvfs` before any field is read.
    unsafe {
        let mut stat = MaybeUninit::<libc::statvfs>::uninit();
        if libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return Err(HealthProbeError::InvalidReadFileSystemInfo);
        }
        let stat = stat.assume_init();
        let capacity = stat.f_blocks as u64 * stat.f_frsize as u64;
        let available = stat.f_bavail as u64 * stat.f_frsize as u64;
        Ok((capacity, available))
    }
}

#[cfg(not(unix))]
fn filesystem_space_info(_directory: &Path) -> Result<(u64, u64), HealthProbeError> {
    Err(HealthProbeError::InvalidReadFileSystemInfo)
}
