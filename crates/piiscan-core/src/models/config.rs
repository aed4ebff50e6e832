//! Configuration structures for the scanning pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default maximum upload size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Default maximum page count.
pub const DEFAULT_MAX_PAGES: u32 = 500;

/// Default per-document wall-clock budget in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Main configuration for the piiscan pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Resource ceilings applied to every document.
    pub limits: LimitsConfig,

    /// Worker pool configuration.
    pub pool: PoolConfig,
}

/// Per-document resource ceilings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in bytes. A file of exactly this size is accepted.
    pub max_file_size: u64,

    /// Maximum number of pages.
    pub max_pages: u32,

    /// Wall-clock budget for one document, in seconds.
    pub timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl LimitsConfig {
    /// Wall-clock budget as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of scans allowed to run in parallel.
    pub pool_size: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            pool_size: cpus.min(8),
        }
    }
}

impl ScanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }

    /// Check that the values are usable.
    pub fn validate(&self) -> crate::Result<()> {
        if self.limits.max_file_size == 0 {
            return Err(crate::ScanError::Config("max_file_size must be positive".into()));
        }
        if self.limits.max_pages == 0 {
            return Err(crate::ScanError::Config("max_pages must be positive".into()));
        }
        if self.limits.timeout_secs == 0 {
            return Err(crate::ScanError::Config("timeout_secs must be positive".into()));
        }
        if self.pool.pool_size == 0 {
            return Err(crate::ScanError::Config("pool_size must be positive".into()));
        }
        Ok(())
    }
}
