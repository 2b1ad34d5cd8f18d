//! services/client/src/adapters/storage.rs
//!
//! Persisted key-value storage, the equivalent of the browser's local storage.
//! Implements the `KeyValueStore` port from the `core` crate.

use docchat_core::ports::{KeyValueStore, PortError, PortResult};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key holding the bearer token of the current session.
pub const TOKEN_KEY: &str = "token";
/// Key holding the string-encoded id of the conversation shown in the chat view.
pub const ACTIVE_CONVERSATION_KEY: &str = "activeConvId";

/// Errors raised while loading or writing the state file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<StorageError> for PortError {
    fn from(err: StorageError) -> Self {
        PortError::Unexpected(err.to_string())
    }
}

//=========================================================================================
// JSON File Store
//=========================================================================================

/// A key-value store persisted as a flat JSON object in a single file.
///
/// Every mutation rewrites the file atomically (temp file + rename), so a
/// crash never leaves a half-written state behind.
pub struct JsonFileStore {
    file_path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Opens the store, loading existing entries. A missing file is an empty store.
    pub fn open(file_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let file_path = file_path.into();
        let entries = if file_path.exists() {
            let contents = std::fs::read_to_string(&file_path).map_err(|source| {
                StorageError::Io {
                    path: file_path.clone(),
                    source,
                }
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %file_path.display(), keys = entries.len(), "Opened state file");

        Ok(Self {
            file_path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source: std::io::Error| StorageError::Io {
            path: self.file_path.clone(),
            source,
        };

        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let temp_path = self.file_path.with_extension("json.tmp");
        std::fs::write(&temp_path, json).map_err(io_err)?;
        std::fs::rename(&temp_path, &self.file_path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        let mut entries = self.entries.lock();
        if entries.remove(key).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}

//=========================================================================================
// In-Memory Store
//=========================================================================================

/// Non-persistent store, useful for tests and throwaway sessions.
#[derive(Default)]
pub struct InMemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> PortResult<()> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> PortResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
