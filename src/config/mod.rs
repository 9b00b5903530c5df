use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation failed: {0}")]
    Validation(String),
}

/// Values consumed by the shipper. Everything except `paths` and `host`
/// has a default; durations are humantime strings ("24h", "10s").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub paths: Vec<PathBuf>,
    pub host: String,

    #[serde(default = "default_index")]
    pub index: String,

    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    #[serde(default = "default_dead_file_threshold", with = "humantime_serde")]
    pub dead_file_threshold: Duration,

    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,

    #[serde(default = "default_dispatch_interval", with = "humantime_serde")]
    pub dispatch_interval: Duration,

    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_index() -> String {
    "skiff".to_string()
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("skiff.db")
}

fn default_dead_file_threshold() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_dispatch_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_batch_size() -> usize {
    128
}

fn default_queue_capacity() -> usize {
    2048
}

impl Config {
    /// Watched paths with duplicates removed, first occurrence wins.
    /// One tailer is started per unique path.
    pub fn unique_paths(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        self.paths
            .iter()
            .filter(|p| seen.insert(p.as_path()))
            .cloned()
            .collect()
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let file = File::open(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to open config file '{}': {}", path.display(), e),
        ))
    })?;

    let config: Config = serde_yaml::from_reader(file)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.paths.is_empty() {
        return Err(ConfigError::Validation("no paths defined".to_string()));
    }
    if config.host.is_empty() {
        return Err(ConfigError::Validation("host not defined".to_string()));
    }
    if config.max_batch_size == 0 {
        return Err(ConfigError::Validation(
            "max_batch_size must be at least 1".to_string(),
        ));
    }
    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "queue_capacity must be at least 1".to_string(),
        ));
    }
    Ok(())
}
