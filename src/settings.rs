//! Flat key-value settings used to persist the selected override set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde_json::{Map, Value};

use crate::error::PersistenceError;

/// String key-value store supplied by the host.
pub trait SettingsStore: Send + Sync {
    /// Read a value.
    fn get_string(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Write a value. `None` clears the key.
    fn set_string(&self, key: &str, value: Option<&str>) -> Result<(), PersistenceError>;
}

/// In-memory settings.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    /// Create empty settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set initial values.
    pub fn with_values(self, values: HashMap<String, String>) -> Self {
        *self.values.write().unwrap_or_else(PoisonError::into_inner) = values;
        self
    }
}

impl SettingsStore for MemorySettings {
    fn get_string(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let values = self
            .values
            .read()
            .map_err(|_| PersistenceError::Unavailable("Lock poisoned".into()))?;
        Ok(values.get(key).cloned())
    }

    fn set_string(&self, key: &str, value: Option<&str>) -> Result<(), PersistenceError> {
        let mut values = self
            .values
            .write()
            .map_err(|_| PersistenceError::Unavailable("Lock poisoned".into()))?;
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// Settings stored as one JSON object in a file.
#[derive(Debug)]
pub struct JsonFileSettings {
    path: PathBuf,
    // Serializes read-modify-write cycles from this process.
    lock: RwLock<()>,
}

impl JsonFileSettings {
    /// Use the file at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    /// Path of the settings file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, PersistenceError> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<Value>(&data) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) | Err(_) => {
                tracing::warn!("Ignoring malformed settings file {:?}", self.path);
                Ok(Map::new())
            }
        }
    }

    fn store(&self, map: &Map<String, Value>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(map)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileSettings {
    fn get_string(&self, key: &str) -> Result<Option<String>, PersistenceError> {
        let _guard = self.lock.read().unwrap_or_else(PoisonError::into_inner);
        let map = self.load()?;
        Ok(map.get(key).and_then(Value::as_str).map(str::to_string))
    }

    fn set_string(&self, key: &str, value: Option<&str>) -> Result<(), PersistenceError> {
        let _guard = self.lock.write().unwrap_or_else(PoisonError::into_inner);
        let mut map = self.load()?;
        match value {
            Some(value) => map.insert(key.to_string(), Value::String(value.to_string())),
            None => map.remove(key),
        };
        self.store(&map)
    }
}
