//! Default filesystem locations.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! # Environment Overrides
//!
//! - `PACER_DATA_DIR` overrides [`data_dir`]
//! - `PACER_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root: persisted state and daily logs.
///
/// Resolves to `dirs::data_dir()/pacer/` by default.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PACER_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("pacer"))
        .unwrap_or_else(|| PathBuf::from("/tmp/pacer-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/pacer/` by default.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("PACER_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("pacer"))
        .unwrap_or_else(|| PathBuf::from("/tmp/pacer-config"))
}

/// Daily log directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Persisted state file (`data_dir()/state.json`).
#[must_use]
pub fn state_file() -> PathBuf {
    data_dir().join("state.json")
}

/// Main config file (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}
