use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::atomic_io::write_text_atomic;
use super::RegistryError;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable copy of every fact and counter in a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub facts: BTreeMap<String, bool>,
    pub counters: BTreeMap<String, i64>,
}

/// Where registry snapshots go between runs.
pub trait FactStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError>;
    /// `Ok(None)` when nothing has been saved yet.
    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError>;
}

/// Store that keeps nothing. Saving succeeds, loading finds nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFactStore;

impl FactStore for NullFactStore {
    fn save(&self, _snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        Ok(())
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        Ok(None)
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FactStore for JsonFileStore {
    fn save(&self, snapshot: &RegistrySnapshot) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(snapshot).map_err(|error| {
            RegistryError::Encode {
                path: self.path.clone(),
                message: error.to_string(),
            }
        })?;
        write_text_atomic(&self.path, &json).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })
    }

    fn load(&self) -> Result<Option<RegistrySnapshot>, RegistryError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| RegistryError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut deserializer = serde_json::Deserializer::from_str(&raw);
        let snapshot: RegistrySnapshot = serde_path_to_error::deserialize(&mut deserializer)
            .map_err(|error| RegistryError::Decode {
                path: self.path.clone(),
                json_path: error.path().to_string(),
                message: error.inner().to_string(),
            })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(RegistryError::UnsupportedVersion {
                path: self.path.clone(),
                found: snapshot.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(Some(snapshot))
    }
}
