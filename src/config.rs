//! Configuration for the pacer toolkit.
//!
//! Loaded from TOML. Every section is optional and falls back to its
//! defaults, so an empty file is a valid configuration.
//!
//! ```toml
//! [limits.email]
//! capacity = 5
//! refill_interval_ms = 60000
//! min_spacing_ms = 2000
//!
//! [queue]
//! concurrency = 2
//!
//! [heartbeat]
//! tick_secs = 300
//! ```

use crate::error::{PacerError, Result};
use crate::queue::QueueConfig;
use crate::rate_limit::RateLimitConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacerConfig {
    /// Rate limits keyed by resource name.
    pub limits: BTreeMap<String, RateLimitConfig>,
    /// Work queue settings.
    pub queue: QueueConfig,
    /// Heartbeat loop settings.
    pub heartbeat: HeartbeatConfig,
    /// Daily log settings.
    pub logs: LogsConfig,
}

/// Heartbeat loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Seconds between heartbeat ticks.
    pub tick_secs: u64,
    /// State file (None = `paths::state_file()`).
    pub state_file: Option<PathBuf>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            state_file: None,
        }
    }
}

impl HeartbeatConfig {
    /// Configured state file or the platform default.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(crate::paths::state_file)
    }
}

/// Daily log settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    /// Log directory (None = `paths::logs_dir()`).
    pub dir: Option<PathBuf>,
}

impl LogsConfig {
    /// Configured log directory or the platform default.
    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(crate::paths::logs_dir)
    }
}

impl PacerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| PacerError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| PacerError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        crate::paths::config_file()
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<()> {
        for (name, limit) in &self.limits {
            limit
                .validate()
                .map_err(|e| PacerError::Config(format!("limit '{name}': {e}")))?;
        }
        self.queue.validate()?;
        if self.heartbeat.tick_secs == 0 {
            return Err(PacerError::Config(
                "heartbeat.tick_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}
