//! Task registry configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment variables (TASKPOOL_*)
//! 2. Config file (--config, or ~/.config/taskpool/config.toml)
//! 3. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [pool]
//! max_workers = 8
//! idle_timeout_secs = 30
//!
//! [tasks]
//! max_finished = 100
//! ```
//!
//! # Usage
//!
//! ```rust
//! use taskpool::util::config::RegistryConfig;
//!
//! let config = RegistryConfig::from_toml_str("[tasks]\nmax_finished = 5\n").unwrap();
//! assert_eq!(config.tasks.max_finished, 5);
//! assert_eq!(config.pool.max_workers, 4);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `pool.max_workers`.
pub const ENV_MAX_WORKERS: &str = "TASKPOOL_MAX_WORKERS";
/// Environment variable overriding `pool.idle_timeout_secs`.
pub const ENV_IDLE_TIMEOUT_SECS: &str = "TASKPOOL_IDLE_TIMEOUT_SECS";
/// Environment variable overriding `tasks.max_finished`.
pub const ENV_MAX_FINISHED: &str = "TASKPOOL_MAX_FINISHED";

/// Registry configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RegistryConfig {
    /// Worker pool settings
    #[serde(default)]
    pub pool: PoolConfig,
    /// Task retention settings
    #[serde(default)]
    pub tasks: TaskConfig,
}

/// Worker pool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of worker threads
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Seconds an idle worker waits before retiring
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Worker thread name prefix
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_max_workers() -> usize {
    4
}

fn default_idle_timeout_secs() -> u64 {
    120
}

fn default_thread_name() -> String {
    "taskpool-worker".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            idle_timeout_secs: default_idle_timeout_secs(),
            thread_name: default_thread_name(),
        }
    }
}

/// Task retention configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Number of finished tasks kept for status queries
    #[serde(default = "default_max_finished")]
    pub max_finished: usize,
}

fn default_max_finished() -> usize {
    20
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_finished: default_max_finished(),
        }
    }
}

impl RegistryConfig {
    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Idle timeout as a [`Duration`].
    #[inline]
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool.idle_timeout_secs)
    }

    /// Reject settings the registry cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.max_workers == 0 {
            return Err(ConfigError::Invalid(
                "pool.max_workers must be at least 1".to_string(),
            ));
        }
        if self.tasks.max_finished == 0 {
            return Err(ConfigError::Invalid(
                "tasks.max_finished must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `TASKPOOL_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_MAX_WORKERS) {
            self.pool.max_workers = parse_override(ENV_MAX_WORKERS, &value)?;
        }
        if let Some(value) = lookup(ENV_IDLE_TIMEOUT_SECS) {
            self.pool.idle_timeout_secs = parse_override(ENV_IDLE_TIMEOUT_SECS, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_FINISHED) {
            self.tasks.max_finished = parse_override(ENV_MAX_FINISHED, &value)?;
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(
    key: &str,
    value: &str,
) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Override {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("taskpool"));
    }

    // Fallback to ~/.config/taskpool
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("taskpool"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("taskpool"));
    }

    None
}

/// Get the user config file path (~/.config/taskpool/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load configuration from a file
pub fn load_config(path: &Path) -> Result<RegistryConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    RegistryConfig::from_toml_str(&content)
}

/// Load user-level configuration
/// Returns default config if file doesn't exist
pub fn load_user_config() -> Result<RegistryConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => Ok(RegistryConfig::default()),
    }
}

/// Save configuration to a file, creating parent directories
pub fn save_config(
    config: &RegistryConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::Io)?;
        }
    }

    let content = config.to_toml_string()?;
    fs::write(path, content).map_err(ConfigError::Io)?;

    Ok(())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(toml::ser::Error),

    #[error("Invalid value {value:?} for {key}")]
    Override { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
