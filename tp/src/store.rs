//! JsonStore - atomic JSON-file persistence primitive
//!
//! One file, one top-level JSON object. Loads tolerate missing or corrupt
//! files by starting empty; every save writes a sibling temp file and
//! rename-replaces so no reader ever observes partial content.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A string-keyed map of JSON values backed by one file
pub struct JsonStore {
    path: PathBuf,
    data: Map<String, Value>,
}

impl JsonStore {
    /// Open a store, creating parent directories. Missing or unreadable
    /// files initialize an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create store directory")?;
        }

        let data = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!(path = %path.display(), "Store file corrupt, starting empty");
                    Map::new()
                }
            },
            Err(_) => Map::new(),
        };

        debug!(path = %path.display(), keys = data.len(), "Opened store");
        Ok(Self { path, data })
    }

    /// Path this store persists to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get a raw value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Get and deserialize a value by key
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data.get(key).cloned().and_then(|v| serde_json::from_value(v).ok())
    }

    /// Set a value and persist
    pub fn set(&mut self, key: impl Into<String>, value: impl Serialize) -> Result<()> {
        let value = serde_json::to_value(value).context("Failed to serialize store value")?;
        self.data.insert(key.into(), value);
        self.save()
    }

    /// Set several values, persisting once
    pub fn set_many(&mut self, entries: Vec<(String, Value)>) -> Result<()> {
        for (key, value) in entries {
            self.data.insert(key, value);
        }
        self.save()
    }

    /// Replace the entire contents and persist (removed keys disappear)
    pub fn replace_all(&mut self, data: Map<String, Value>) -> Result<()> {
        self.data = data;
        self.save()
    }

    /// Remove a key and persist; returns whether the key existed
    pub fn delete(&mut self, key: &str) -> Result<bool> {
        let existed = self.data.remove(key).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    /// All data (cloned)
    pub fn all(&self) -> Map<String, Value> {
        self.data.clone()
    }

    /// Atomic write: sibling temp file, then rename-replace. The temp file
    /// is removed unconditionally on failure.
    fn save(&self) -> Result<()> {
        let temp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(&self.data).context("Failed to serialize store")?;

        if let Err(e) = fs::write(&temp, &bytes) {
            let _ = fs::remove_file(&temp);
            return Err(e).context("Failed to write store temp file");
        }
        if let Err(e) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(e).context("Failed to replace store file");
        }
        Ok(())
    }
}
