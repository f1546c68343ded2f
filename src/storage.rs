//! Key-value persistence for client-only state.
//!
//! The identity store, preference cache, and page presence all persist
//! through this seam so tests can substitute an in-memory store for the
//! on-disk one. Everything stored here is a best-effort cache, never the
//! sole source of truth.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

/// Keys used by this crate. Kept in one place so the on-disk file stays
/// greppable.
pub mod keys {
    /// Durable per-profile identity token (identity store).
    pub const MONITORING_SESSION_ID: &str = "monitoring_session_id";
    /// Page-level presence session, distinct from per-access tokens.
    pub const CURRENT_SESSION_ID: &str = "current_session_id";
    /// Serialized `{service_id: bool}` favorites map.
    pub const FAVORITES_MAP: &str = "favoritesMap";
    /// Serialized `{service_id: group_id}` assignment map.
    pub const GROUP_ASSIGNMENTS: &str = "groupAssignments";
}

/// Errors from the persistent store. Callers in the telemetry paths treat
/// these as degradations, not failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to read state file {0}: {1}")]
    ReadFailed(PathBuf, #[source] std::io::Error),
    #[error("failed to write state file {0}: {1}")]
    WriteFailed(PathBuf, #[source] std::io::Error),
    #[error("state file {0} is not valid JSON: {1}")]
    ParseFailed(PathBuf, #[source] serde_json::Error),
}

/// String key-value store with fallible writes.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory store for tests and for callers that opted out of persistence.
#[derive(Default)]
pub struct MemoryStore {
    map: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.map.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.map.write().remove(key);
        Ok(())
    }
}

/// Single-file JSON store.
///
/// The whole map is rewritten on every set; state is a handful of short
/// strings, so simplicity wins over journaling. The in-memory copy is the
/// read path; the file is only reread at construction.
pub struct FileStore {
    path: PathBuf,
    map: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`. A missing file is an empty
    /// store; a corrupt file is an error so the caller can decide whether to
    /// start over.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let map = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| StorageError::ReadFailed(path.to_path_buf(), e))?;
            serde_json::from_str(&contents)
                .map_err(|e| StorageError::ParseFailed(path.to_path_buf(), e))?
        } else {
            HashMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            map: RwLock::new(map),
        })
    }

    /// Default on-disk location: `<data_dir>/svcwatch/state.json`.
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("svcwatch")
            .join("state.json")
    }

    fn flush(&self, map: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::WriteFailed(self.path.clone(), e))?;
        }
        let contents = serde_json::to_string_pretty(map)
            .map_err(|e| StorageError::WriteFailed(self.path.clone(), std::io::Error::other(e)))?;
        std::fs::write(&self.path, contents)
            .map_err(|e| StorageError::WriteFailed(self.path.clone(), e))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut map = self.map.write();
        map.insert(key.to_string(), value.to_string());
        self.flush(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self.map.write();
        map.remove(key);
        self.flush(&map)
    }
}

/// Shared handle type used throughout the crate.
pub type SharedStore = Arc<dyn KeyValueStore>;
