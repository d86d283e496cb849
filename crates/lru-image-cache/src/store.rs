//! Backing store primitives
//!
//! [`FsStore`] is the production store on `tokio::fs`. [`MemoryStore`] keeps
//! everything in a map and is meant for tests and embedding.

use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait BackingStore: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    /// Fails with [`CacheError::NotFound`] when nothing is stored at `path`
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Replace the whole content at `path`
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Store content at a path that must not exist yet
    async fn create(&self, path: &Path, data: &[u8]) -> Result<()>;

    /// Delete a file or a directory tree; deleting a missing path succeeds
    async fn delete(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    pub fn new() -> Self {
        Self
    }
}

async fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| CacheError::StoreWrite(e.to_string()))?;
        }
    }
    Ok(())
}

/// Unique scratch name next to `path`, so concurrent writers never share one
fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

#[async_trait]
impl BackingStore for FsStore {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        match fs::read(path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(CacheError::NotFound(path.into())),
            Err(e) => Err(CacheError::StoreRead(e.to_string())),
        }
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        ensure_parent(path).await?;
        // Write next to the target and rename so readers never see a partial file
        let temp = temp_sibling(path);
        let result = match fs::write(&temp, data).await {
            Ok(()) => fs::rename(&temp, path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(CacheError::StoreWrite(e.to_string()));
        }
        Ok(())
    }

    async fn create(&self, path: &Path, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        ensure_parent(path).await?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))?;
        file.write_all(data)
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| CacheError::StoreWrite(e.to_string()))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let result = match fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
            Ok(_) => fs::remove_file(path).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = ?path, "Nothing to delete");
                Ok(())
            }
            Err(e) => Err(CacheError::StoreWrite(e.to_string())),
        }
    }
}

/// In-memory store keyed by path
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, path: impl Into<PathBuf>, data: impl Into<Vec<u8>>) {
        self.files.lock().await.insert(path.into(), data.into());
    }

    pub async fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    pub async fn len(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.lock().await.is_empty()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn exists(&self, path: &Path) -> bool {
        self.files.lock().await.contains_key(path)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(path.into()))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.files.lock().await.insert(path.into(), data.to_vec());
        Ok(())
    }

    async fn create(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut files = self.files.lock().await;
        if files.contains_key(path) {
            return Err(CacheError::StoreWrite(format!(
                "{} already exists",
                path.display()
            )));
        }
        files.insert(path.into(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        // Directory semantics: drop everything underneath as well
        self.files
            .lock()
            .await
            .retain(|stored, _| !stored.starts_with(path));
        Ok(())
    }
}
