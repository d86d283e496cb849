//! Fakes shared by the unit tests

use crate::error::{CacheError, Result};
use crate::remote::RemoteSource;
use crate::store::{BackingStore, MemoryStore};
use crate::types::ImageSource;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const PAYLOAD: &[u8] = b"\x89PNG fake image bytes";

/// Remote that "downloads" into a shared [`MemoryStore`]
pub struct FakeRemote {
    pub store: Arc<MemoryStore>,
    pub delay: Duration,
    /// Per-transfer delays, consumed in order before falling back to `delay`
    pub delays: Mutex<VecDeque<Duration>>,
    pub resolves: AtomicUsize,
    pub transfers: AtomicUsize,
    pub fail_resolve: AtomicBool,
    pub fail_transfer: AtomicBool,
    pub destinations: Mutex<Vec<PathBuf>>,
}

impl FakeRemote {
    pub fn new(store: Arc<MemoryStore>) -> Self {
        Self::with_delay(store, Duration::ZERO)
    }

    pub fn with_delay(store: Arc<MemoryStore>, delay: Duration) -> Self {
        Self {
            store,
            delay,
            delays: Mutex::new(VecDeque::new()),
            resolves: AtomicUsize::new(0),
            transfers: AtomicUsize::new(0),
            fail_resolve: AtomicBool::new(false),
            fail_transfer: AtomicBool::new(false),
            destinations: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delays(store: Arc<MemoryStore>, delays: &[Duration]) -> Self {
        let remote = Self::new(store);
        remote.delays.lock().unwrap().extend(delays.iter().copied());
        remote
    }

    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::SeqCst)
    }

    pub fn destinations(&self) -> Vec<PathBuf> {
        self.destinations.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteSource for FakeRemote {
    async fn resolve(&self, key: &str, _source: &ImageSource) -> Result<Url> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolve.load(Ordering::SeqCst) {
            return Err(CacheError::Resolution(format!("no such object {}", key)));
        }
        Ok(Url::parse(&format!("https://objects.test/{}", key))?)
    }

    async fn transfer(
        &self,
        _uri: &Url,
        dest: &Path,
        _method: &str,
        _headers: &[(String, String)],
    ) -> Result<()> {
        self.transfers.fetch_add(1, Ordering::SeqCst);
        self.destinations.lock().unwrap().push(dest.to_path_buf());
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_transfer.load(Ordering::SeqCst) {
            self.store.insert(dest, &PAYLOAD[..4]).await;
            return Err(CacheError::Transfer("connection reset".to_string()));
        }
        self.store.insert(dest, PAYLOAD).await;
        Ok(())
    }
}

/// Store wrapper that counts reads and can stall or fail them
pub struct CountingStore {
    pub inner: MemoryStore,
    pub read_delay: Duration,
    pub reads: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl CountingStore {
    pub fn new(read_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            read_delay,
            reads: AtomicUsize::new(0),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BackingStore for CountingStore {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheError::StoreWrite("read-only file system".to_string()));
        }
        self.inner.write(path, data).await
    }

    async fn create(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.inner.create(path, data).await
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        self.inner.delete(path).await
    }
}

/// Join keys the way the queue renders itself
pub fn render(keys: &[String]) -> String {
    keys.iter().map(|k| format!("{}->", k)).collect()
}
