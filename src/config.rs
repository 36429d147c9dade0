//! Optional TOML configuration.
//!
//! ```toml
//! concurrency = 16
//! delete_batch_size = 100
//! max_reported_errors = 10
//! bandwidth_limit = 0
//!
//! [s3]
//! provider = "r2"
//! region = "auto"
//!
//! [gcs]
//! credential_path = "/etc/gcs/key.json"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::ConfigError;
use crate::fs::S3Options;
use crate::sync::executor::{ExecutorConfig, DEFAULT_DELETE_BATCH_SIZE, DEFAULT_MAX_REPORTED_ERRORS};
use crate::sync::throttle::BandwidthLimit;

/// GCS connection settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GcsOptions {
    /// Service account key file; Application Default Credentials otherwise.
    pub credential_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub concurrency: usize,
    pub delete_batch_size: usize,
    pub max_reported_errors: usize,
    /// Bytes per second, 0 = unlimited.
    pub bandwidth_limit: u64,
    pub s3: S3Options,
    pub gcs: GcsOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            concurrency: num_cpus::get(),
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
            max_reported_errors: DEFAULT_MAX_REPORTED_ERRORS,
            bandwidth_limit: 0,
            s3: S3Options::default(),
            gcs: GcsOptions::default(),
        }
    }
}

impl Config {
    /// `<config_dir>/bucketsync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("bucketsync").join("config.toml"))
    }

    /// Load `explicit` if given (it must exist), else the default file if
    /// present, else built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path().filter(|path| path.is_file()) {
                Some(path) => Self::load_from_file(&path),
                None => {
                    debug!("no config file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".to_string()));
        }
        if self.delete_batch_size == 0 {
            return Err(ConfigError::Invalid("delete_batch_size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            concurrency: self.concurrency.max(1),
            delete_batch_size: self.delete_batch_size.max(1),
            max_reported_errors: self.max_reported_errors,
        }
    }

    pub fn bandwidth(&self) -> BandwidthLimit {
        BandwidthLimit::new(self.bandwidth_limit)
    }
}
