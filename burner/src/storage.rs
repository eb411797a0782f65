//! Key-value persistence backends.
//!
//! The account store keeps its whole state as one blob under one key, so
//! all a backend has to provide is get / set / remove of opaque bytes.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreResult;

/// Trait for durable key-value backends.
#[async_trait]
pub trait KeyValueStore: Send + Sync + std::fmt::Debug {
    /// Read the blob stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Replace the blob stored under `key`.
    ///
    /// A concurrent [`get`](Self::get) sees either the old or the new blob.
    async fn set(&self, key: &str, blob: &[u8]) -> StoreResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

/// In-memory storage.
///
/// Fast but not persistent across restarts.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    /// Create an empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: &[u8]) -> StoreResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

/// File-based storage.
///
/// Each key lives in its own file, `<scope>.<key>`, inside one directory.
/// Writes go to a temporary sibling first and are renamed into place.
#[derive(Debug)]
pub struct FileStorage {
    base_path: PathBuf,
    scope: String,
    writes: AtomicU64,
}

impl FileStorage {
    /// Create a file storage rooted at `base_path` under the default scope.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self::scoped(base_path, "burner")
    }

    /// Create a file storage whose keys are prefixed with `scope`.
    pub fn scoped(base_path: impl Into<PathBuf>, scope: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
            scope: scope.into(),
            writes: AtomicU64::new(0),
        }
    }

    /// Directory the files live in.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a key.
    fn entry_path(&self, key: &str) -> PathBuf {
        // Sanitize key for filename
        let safe_key = key.replace([':', '/', '\\'], "_");
        self.base_path.join(format!("{}.{safe_key}", self.scope))
    }
}

#[async_trait]
impl KeyValueStore for FileStorage {
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.entry_path(key);
        match tokio::fs::read(&path).await {
            Ok(blob) => {
                debug!(path = %path.display(), bytes = blob.len(), "read entry");
                Ok(Some(blob))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, blob: &[u8]) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.base_path).await?;

        let path = self.entry_path(key);
        let write = self.writes.fetch_add(1, Ordering::Relaxed);
        let mut tmp = path.clone().into_os_string();
        tmp.push(format!(".tmp{write}"));
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, blob).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        debug!(path = %path.display(), bytes = blob.len(), "wrote entry");
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.entry_path(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "removed entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
