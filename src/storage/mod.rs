//! Local key-value persistence for controller and display state.
//!
//! Both roles keep their state in a single JSON document keyed by stable
//! names. The controller and each display use separate files, so there is
//! only ever one writer per file.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, trace};


const STORAGE_LOG_TARGET: &str = "nowplaying_sync::storage";

/// Key holding the controller's `{playlist, currentIndex}` record.
pub const PLAYLIST_KEY: &str = "playlist";
/// Key holding the controller's scalar volume.
pub const VOLUME_KEY: &str = "volume";
/// Key holding a display's replica of the last snapshot.
pub const DISPLAY_SNAPSHOT_KEY: &str = "displaySnapshot";

/// Errors raised by a [`KeyValueStore`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Store lock poisoned")]
    Poisoned,
}

/// A string-valued key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store, used by tests and as a fallback when no file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object on disk.
///
/// Every `set` rewrites the whole file through a temporary sibling and a
/// rename, so a crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A missing file is an empty document; a file that
    /// is not a JSON object is reported as a parse error.
    fn read_document(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            trace!(target: STORAGE_LOG_TARGET, path = %self.path.display(), "State file absent, using empty document.");
            return Ok(Map::new());
        }
        let content = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(StorageError::Parse(serde::de::Error::custom(
                "state file is not a JSON object",
            ))),
        }
    }

    fn write_document(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(document)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &self.path)?;
        debug!(target: STORAGE_LOG_TARGET, path = %self.path.display(), "State file written.");
        Ok(())
    }

    /// Loads the current document for a mutation. An unreadable document is
    /// replaced rather than blocking all future writes.
    fn document_for_write(&self) -> Result<Map<String, Value>, StorageError> {
        match self.read_document() {
            Ok(document) => Ok(document),
            Err(StorageError::Parse(e)) => {
                debug!(target: STORAGE_LOG_TARGET, "Discarding unreadable state file: {}", e);
                Ok(Map::new())
            }
            Err(e) => Err(e),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let document = self.read_document()?;
        Ok(document.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut document = self.document_for_write()?;
        document.insert(key.to_string(), Value::String(value.to_string()));
        self.write_document(&document)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().map_err(|_| StorageError::Poisoned)?;
        let mut document = self.document_for_write()?;
        if document.remove(key).is_some() {
            self.write_document(&document)?;
        }
        Ok(())
    }
}
