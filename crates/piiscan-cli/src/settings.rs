//! Configuration loading and command-line overrides.

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::debug;

use piiscan_core::ScanConfig;

/// Limits that override the configuration file.
#[derive(Args, Debug, Default)]
pub struct LimitArgs {
    /// Maximum file size in bytes
    #[arg(long, global = true, env = "PIISCAN_MAX_FILE_SIZE")]
    pub max_file_size: Option<u64>,

    /// Maximum page count
    #[arg(long, global = true, env = "PIISCAN_MAX_PAGES")]
    pub max_pages: Option<u32>,

    /// Per-document timeout in seconds
    #[arg(long, global = true, env = "PIISCAN_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Number of parallel workers
    #[arg(short = 'j', long = "workers", global = true, env = "PIISCAN_POOL_SIZE")]
    pub pool_size: Option<usize>,
}

impl LimitArgs {
    fn apply(&self, config: &mut ScanConfig) {
        if let Some(size) = self.max_file_size {
            config.limits.max_file_size = size;
        }
        if let Some(pages) = self.max_pages {
            config.limits.max_pages = pages;
        }
        if let Some(secs) = self.timeout_secs {
            config.limits.timeout_secs = secs;
        }
        if let Some(size) = self.pool_size {
            config.pool.pool_size = size;
        }
    }
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("piiscan")
        .join("config.json")
}

/// Explicit path, else the default file when it exists, else defaults.
pub fn read_config(path: Option<&str>) -> anyhow::Result<ScanConfig> {
    match path {
        Some(path) => Ok(ScanConfig::from_file(Path::new(path))?),
        None => {
            let default_path = default_config_path();
            if default_path.exists() {
                debug!("Using config from {}", default_path.display());
                Ok(ScanConfig::from_file(&default_path)?)
            } else {
                Ok(ScanConfig::default())
            }
        }
    }
}

/// Read the configuration, apply overrides and validate.
pub fn load(path: Option<&str>, overrides: &LimitArgs) -> anyhow::Result<ScanConfig> {
    let mut config = read_config(path)?;
    overrides.apply(&mut config);
    config.validate()?;
    debug!("Effective config: {:?}", config);
    Ok(config)
}
