//! Persisted key-value state.
//!
//! A flat JSON object on disk. Stored keys are merged over caller-supplied
//! defaults at open time, and every mutation rewrites the file through a
//! sibling temp file followed by a rename, so readers never see a partial
//! write.

use crate::error::{PacerError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// JSON-file-backed key-value store.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
    defaults: Map<String, Value>,
    values: Map<String, Value>,
}

impl StateStore {
    /// Open the store at `path`, merging any stored keys over `defaults`.
    ///
    /// A missing file yields the defaults and is not created until the
    /// first mutation.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::State`] if the file exists but cannot be read or
    /// does not hold a JSON object.
    pub fn open(path: impl Into<PathBuf>, defaults: Map<String, Value>) -> Result<Self> {
        let path = path.into();
        let mut values = defaults.clone();

        match std::fs::read(&path) {
            Ok(bytes) => {
                let stored: Map<String, Value> = serde_json::from_slice(&bytes).map_err(|e| {
                    PacerError::State(format!("cannot parse {}: {e}", path.display()))
                })?;
                values.extend(stored);
                debug!("loaded state from {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PacerError::State(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        }

        Ok(Self {
            path,
            defaults,
            values,
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Value for `key` deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::State`] if the stored value has a different shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.values
            .get(key)
            .map(|value| {
                serde_json::from_value(value.clone()).map_err(|e| {
                    PacerError::State(format!("key '{key}' has unexpected shape: {e}"))
                })
            })
            .transpose()
    }

    /// Store `value` under `key` and persist.
    ///
    /// The in-memory value only changes once the write succeeds.
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| PacerError::State(format!("cannot serialize value: {e}")))?;
        let mut values = self.values.clone();
        values.insert(key.into(), value);
        self.commit(values)
    }

    /// Shallow-merge `patch` into the store and persist once.
    pub fn update(&mut self, patch: Map<String, Value>) -> Result<()> {
        let mut values = self.values.clone();
        values.extend(patch);
        self.commit(values)
    }

    /// Remove `key`. Returns `true` when it was present.
    ///
    /// A removed key that has a default reverts to it on the next open.
    pub fn remove(&mut self, key: &str) -> Result<bool> {
        if !self.values.contains_key(key) {
            return Ok(false);
        }
        let mut values = self.values.clone();
        values.remove(key);
        self.commit(values)?;
        Ok(true)
    }

    /// Reset to the defaults and persist.
    pub fn clear(&mut self) -> Result<()> {
        self.commit(self.defaults.clone())
    }

    /// Copy of every key and value.
    #[must_use]
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.clone()
    }

    fn commit(&mut self, values: Map<String, Value>) -> Result<()> {
        self.persist(&values)?;
        self.values = values;
        Ok(())
    }

    fn persist(&self, values: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PacerError::State(format!("cannot create state dir: {e}")))?;
        }

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| PacerError::State(format!("cannot serialize state: {e}")))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, json)
            .map_err(|e| PacerError::State(format!("cannot write state: {e}")))?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(PacerError::State(format!("cannot replace state: {e}")));
        }

        debug!("persisted {} state keys to {}", values.len(), self.path.display());
        Ok(())
    }
}
