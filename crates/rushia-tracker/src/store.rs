//! Persistent key/value storage for the active pointer and the history.
//!
//! # Design
//! - Backends move opaque bytes; [`SessionStore`] owns the JSON layout.
//! - Two stable keys: [`TASK_KEY`] for the pointer and [`HISTORY_KEY`] for the ledger.
//! - A document that fails to decode is deleted and reported as absent.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{TrackerError, TrackerResult};
use crate::model::{ActiveTaskPointer, TaskRecord};

/// Key holding the active task pointer.
pub const TASK_KEY: &str = "rushia_dl_task";
/// Key holding the history ledger.
pub const HISTORY_KEY: &str = "rushia_dl_history";

/// Byte-level storage surviving restarts.
pub trait StateStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    fn read(&self, key: &str) -> TrackerResult<Option<Vec<u8>>>;

    /// Replace the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    fn write(&self, key: &str, value: &[u8]) -> TrackerResult<()>;

    /// Remove `key`; removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    fn delete(&self, key: &str) -> TrackerResult<()>;
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StateStore for MemoryStore {
    fn read(&self, key: &str) -> TrackerResult<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn write(&self, key: &str, value: &[u8]) -> TrackerResult<()> {
        self.entries().insert(key.to_string(), value.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, key: &str) -> TrackerResult<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Backend keeping one JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Store rooted at `root`; the directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the files.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }

    fn store_error(operation: &'static str, path: &Path, source: io::Error) -> TrackerError {
        TrackerError::Store {
            operation,
            key: path.display().to_string(),
            source,
        }
    }
}

impl StateStore for FileStore {
    fn read(&self, key: &str) -> TrackerResult<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Self::store_error("read", &path, err)),
        }
    }

    fn write(&self, key: &str, value: &[u8]) -> TrackerResult<()> {
        fs::create_dir_all(&self.root)
            .map_err(|err| Self::store_error("create_dir", &self.root, err))?;
        let path = self.path_for(key);
        let staging = self.root.join(format!("{key}.json.tmp"));
        fs::write(&staging, value).map_err(|err| Self::store_error("write", &staging, err))?;
        fs::rename(&staging, &path).map_err(|err| Self::store_error("rename", &path, err))
    }

    fn delete(&self, key: &str) -> TrackerResult<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(Self::store_error("delete", &path, err)),
        }
    }
}

/// Typed access to the tracker's persisted documents.
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StateStore>,
}

impl SessionStore {
    /// Wrap a byte-level backend.
    #[must_use]
    pub fn new(backend: Arc<dyn StateStore>) -> Self {
        Self { backend }
    }

    /// Load the active pointer, discarding a corrupt document.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    pub fn load_pointer(&self) -> TrackerResult<Option<ActiveTaskPointer>> {
        self.load(TASK_KEY)
    }

    /// Persist the active pointer.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] or [`TrackerError::Encode`] on failure.
    pub fn save_pointer(&self, pointer: &ActiveTaskPointer) -> TrackerResult<()> {
        self.save(TASK_KEY, pointer)
    }

    /// Remove the active pointer.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    pub fn clear_pointer(&self) -> TrackerResult<()> {
        self.backend.delete(TASK_KEY)
    }

    /// Load the history, most recent first; a corrupt document yields an empty history.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] when the backend fails.
    pub fn load_history(&self) -> TrackerResult<Vec<TaskRecord>> {
        Ok(self.load(HISTORY_KEY)?.unwrap_or_default())
    }

    /// Persist the history in order.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Store`] or [`TrackerError::Encode`] on failure.
    pub fn save_history(&self, records: &[TaskRecord]) -> TrackerResult<()> {
        self.save(HISTORY_KEY, records)
    }

    fn load<T: DeserializeOwned>(&self, key: &'static str) -> TrackerResult<Option<T>> {
        let Some(bytes) = self.backend.read(key)? else {
            return Ok(None);
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(source) => {
                let err = TrackerError::CorruptState { key, source };
                warn!(key, error = ?err, "discarding corrupt persisted state");
                self.backend.delete(key)?;
                Ok(None)
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&self, key: &'static str, value: &T) -> TrackerResult<()> {
        let bytes =
            serde_json::to_vec(value).map_err(|source| TrackerError::Encode { key, source })?;
        self.backend.write(key, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MediaFormat, TaskStatus};
    use chrono::DateTime;

    fn record(id: &str, ms: i64) -> TaskRecord {
        TaskRecord::pending(
            id,
            format!("https://x/watch?v={id}"),
            MediaFormat::Audio,
            DateTime::from_timestamp_millis(ms).expect("timestamp"),
        )
    }

    #[test]
    fn history_round_trips_in_order() {
        let session = SessionStore::new(Arc::new(MemoryStore::new()));
        let mut second = record("b", 2_000);
        second.status = TaskStatus::Completed;
        second.title = Some("Title".into());
        second.filename = Some("b.m4a".into());
        second.progress = Some(100.0);
        let records = vec![second, record("a", 1_000)];

        session.save_history(&records).expect("save");
        assert_eq!(session.load_history().expect("load"), records);
    }

    #[test]
    fn corrupt_pointer_is_deleted_and_reported_absent() {
        let backend = Arc::new(MemoryStore::new());
        backend.write(TASK_KEY, b"{not json").expect("seed");
        let session = SessionStore::new(backend.clone());

        assert_eq!(session.load_pointer().expect("load"), None);
        assert_eq!(backend.read(TASK_KEY).expect("read"), None);
    }

    #[test]
    fn pointer_uses_stable_layout() {
        let backend = Arc::new(MemoryStore::new());
        let session = SessionStore::new(backend.clone());
        let pointer = ActiveTaskPointer::new(
            "t1",
            DateTime::from_timestamp_millis(1_700_000_000_000).expect("timestamp"),
        );
        session.save_pointer(&pointer).expect("save");

        let raw = backend.read(TASK_KEY).expect("read").expect("present");
        let value: serde_json::Value = serde_json::from_slice(&raw).expect("json");
        assert_eq!(
            value,
            serde_json::json!({"taskId": "t1", "timestamp": 1_700_000_000_000_i64})
        );
        session.clear_pointer().expect("clear");
        assert_eq!(session.load_pointer().expect("load"), None);
    }

    #[test]
    fn file_store_survives_reopen_and_tolerates_missing_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().join("state");
        let store = FileStore::new(&root);
        assert_eq!(store.read(HISTORY_KEY).expect("read"), None);
        store.delete(HISTORY_KEY).expect("delete missing");

        store.write(HISTORY_KEY, b"[]").expect("write");
        let reopened = FileStore::new(&root);
        assert_eq!(reopened.read(HISTORY_KEY).expect("read"), Some(b"[]".to_vec()));
        assert!(!root.join("rushia_dl_history.json.tmp").exists());

        reopened.delete(HISTORY_KEY).expect("delete");
        assert_eq!(store.read(HISTORY_KEY).expect("read"), None);
    }
}
