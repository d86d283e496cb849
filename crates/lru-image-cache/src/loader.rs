//! Process-wide cache instance and persisted recency order
//!
//! The first `acquire` loads the persisted order and builds the cache; every
//! caller arriving while that load runs waits on the same `OnceCell` and gets
//! the same instance once it completes. Callers after that return at once.

use crate::cache::{CacheHandle, ImageCache};
use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::policy::LruPolicy;
use crate::remote::{HttpRemote, RemoteSource};
use crate::store::{BackingStore, FsStore};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const EMPTY_ORDER: &[u8] = b"[]";

static GLOBAL: OnceLock<CacheLoader> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderState {
    Uninitialized,
    Loading,
    Ready,
}

pub struct CacheLoader {
    config: CacheConfig,
    store: Arc<dyn BackingStore>,
    remote: Arc<dyn RemoteSource>,
    instance: OnceCell<CacheHandle>,
    loading: AtomicBool,
    pending: AtomicUsize,
}

/// Keeps the waiter count right even if the acquiring future is dropped
struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CacheLoader {
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn BackingStore>,
        remote: Arc<dyn RemoteSource>,
    ) -> Self {
        Self {
            config,
            store,
            remote,
            instance: OnceCell::new(),
            loading: AtomicBool::new(false),
            pending: AtomicUsize::new(0),
        }
    }

    /// Loader over the local file system and HTTP, configured from the environment
    pub fn from_env() -> Self {
        let config = CacheConfig::from_env();
        let remote = HttpRemote::new(config.remote_base_url.clone(), config.transfer_timeout);
        Self::new(config, Arc::new(FsStore::new()), Arc::new(remote))
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub async fn acquire(&self) -> CacheHandle {
        if let Some(handle) = self.instance.get() {
            return handle.clone();
        }
        let _pending = PendingGuard::enter(&self.pending);
        self.instance.get_or_init(|| self.load()).await.clone()
    }

    pub fn state(&self) -> LoaderState {
        if self.instance.initialized() {
            LoaderState::Ready
        } else if self.loading.load(Ordering::SeqCst) {
            LoaderState::Loading
        } else {
            LoaderState::Uninitialized
        }
    }

    /// Callers currently waiting for an instance
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Drop the instance; the next `acquire` starts a fresh lifecycle
    pub fn reset(&mut self) {
        self.instance.take();
        self.loading.store(false, Ordering::SeqCst);
    }

    async fn load(&self) -> CacheHandle {
        self.loading.store(true, Ordering::SeqCst);
        info!(order_file = ?self.config.order_file, "Loading image cache");

        let order = load_order(self.store.as_ref(), &self.config.order_file).await;
        let policy = LruPolicy::from_sequence(order);
        info!(
            tracked = policy.len(),
            capacity = self.config.capacity,
            "Image cache ready"
        );

        Arc::new(ImageCache::with_policy(
            &self.config,
            self.store.clone(),
            self.remote.clone(),
            policy,
        ))
    }
}

/// Install the process-wide loader; hands it back if one is already set
pub fn install(loader: CacheLoader) -> std::result::Result<(), CacheLoader> {
    GLOBAL.set(loader)
}

/// The process-wide cache, built from the environment unless [`install`] ran first
pub async fn acquire_singleton() -> CacheHandle {
    GLOBAL.get_or_init(CacheLoader::from_env).acquire().await
}

/// Read the persisted order, falling back to empty on any problem
pub async fn load_order(store: &dyn BackingStore, path: &Path) -> Vec<String> {
    match store.read(path).await {
        Ok(data) => match serde_json::from_slice::<Vec<String>>(&data) {
            Ok(order) => order,
            Err(e) => {
                warn!(
                    path = ?path,
                    error = %CacheError::from(e),
                    "Ignoring persisted order"
                );
                Vec::new()
            }
        },
        Err(CacheError::NotFound(_)) => {
            debug!(path = ?path, "No persisted order, creating an empty one");
            if let Err(e) = store.create(path, EMPTY_ORDER).await {
                warn!(path = ?path, error = %e, "Failed to create order file");
            }
            Vec::new()
        }
        Err(e) => {
            warn!(path = ?path, error = %e, "Failed to read persisted order");
            Vec::new()
        }
    }
}

/// Overwrite the persisted order; failures are logged and swallowed
pub async fn save_order(store: &dyn BackingStore, path: &Path, order: &[String]) {
    let data = match serde_json::to_vec(order) {
        Ok(data) => data,
        Err(e) => {
            warn!(error = %e, "Failed to serialize recency order");
            return;
        }
    };
    match store.write(path, &data).await {
        Ok(()) => debug!(path = ?path, tracked = order.len(), "Saved recency order"),
        Err(e) => warn!(path = ?path, error = %e, "Failed to save recency order"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testutil::{render, CountingStore, FakeRemote};
    use std::path::PathBuf;
    use std::time::Duration;

    const ORDER_FILE: &str = "/data/queue.json";

    fn config() -> CacheConfig {
        CacheConfig {
            cache_dir: PathBuf::from("/data/images"),
            order_file: PathBuf::from(ORDER_FILE),
            capacity: 5,
            ..CacheConfig::default()
        }
    }

    fn loader(store: Arc<dyn BackingStore>) -> CacheLoader {
        let remote = Arc::new(FakeRemote::new(Arc::new(MemoryStore::new())));
        CacheLoader::new(config(), store, remote)
    }

    async fn counting(read_delay: Duration, content: Option<&str>) -> Arc<CountingStore> {
        let store = Arc::new(CountingStore::new(read_delay));
        if let Some(content) = content {
            store.inner.insert(ORDER_FILE, content.as_bytes()).await;
        }
        store
    }

    #[tokio::test]
    async fn test_missing_order_file_starts_empty_and_creates_it() {
        let store = counting(Duration::ZERO, None).await;
        let loader = loader(store.clone());

        let cache = loader.acquire().await;

        assert_eq!(cache.stats().await.tracked, 0);
        assert_eq!(render(&cache.recency().await), "");
        assert_eq!(store.inner.read(Path::new(ORDER_FILE)).await.unwrap(), b"[]");
    }

    #[tokio::test]
    async fn test_persisted_order_is_loaded() {
        let store = counting(Duration::ZERO, Some("[\"patha\", \"pathb\", \"pathc\"]")).await;
        let loader = loader(store);

        let cache = loader.acquire().await;

        assert_eq!(cache.stats().await.tracked, 3);
        assert_eq!(render(&cache.recency().await), "pathc->pathb->patha->");
    }

    #[tokio::test]
    async fn test_malformed_order_is_treated_as_empty() {
        let store = counting(Duration::ZERO, Some("{\"not\": \"a list\"")).await;
        let loader = loader(store.clone());

        let cache = loader.acquire().await;
        assert_eq!(loader.state(), LoaderState::Ready);
        assert!(cache.recency().await.is_empty());

        cache.update("fresh.png").await;
        let saved = store.inner.read(Path::new(ORDER_FILE)).await.unwrap();
        assert_eq!(saved, b"[\"fresh.png\"]");
    }

    #[tokio::test]
    async fn test_concurrent_acquire_loads_once() {
        let store = counting(
            Duration::from_millis(50),
            Some("[\"patha\", \"pathb\", \"pathc\"]"),
        )
        .await;
        let loader = loader(store.clone());

        let (first, second, third) =
            tokio::join!(loader.acquire(), loader.acquire(), loader.acquire());

        assert!(Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&second, &third));
        assert_eq!(store.reads(), 1);
        assert_eq!(loader.pending(), 0);
        for cache in [&first, &second, &third] {
            assert_eq!(cache.stats().await.tracked, 3);
            assert_eq!(render(&cache.recency().await), "pathc->pathb->patha->");
        }
    }

    #[tokio::test]
    async fn test_state_transitions() {
        let store = counting(Duration::from_millis(50), Some("[]")).await;
        let loader = Arc::new(loader(store));
        assert_eq!(loader.state(), LoaderState::Uninitialized);

        let background = {
            let loader = loader.clone();
            tokio::spawn(async move { loader.acquire().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(loader.state(), LoaderState::Loading);
        assert_eq!(loader.pending(), 1);

        let first = background.await.unwrap();
        assert_eq!(loader.state(), LoaderState::Ready);
        assert_eq!(loader.pending(), 0);

        // Ready: no new load, same instance
        let again = loader.acquire().await;
        assert!(Arc::ptr_eq(&first, &again));
    }

    #[tokio::test]
    async fn test_reset_starts_new_lifecycle() {
        let store = counting(Duration::ZERO, Some("[\"a\"]")).await;
        let mut loader = loader(store.clone());

        let first = loader.acquire().await;
        loader.reset();
        assert_eq!(loader.state(), LoaderState::Uninitialized);

        let second = loader.acquire().await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(store.reads(), 2);
    }

    #[tokio::test]
    async fn test_save_failure_is_swallowed() {
        let store = counting(Duration::ZERO, Some("[\"a\"]")).await;
        store.fail_writes.store(true, Ordering::SeqCst);
        let loader = loader(store.clone());

        let cache = loader.acquire().await;
        cache.update("b").await;

        assert_eq!(render(&cache.recency().await), "b->a->");
        let saved = store.inner.read(Path::new(ORDER_FILE)).await.unwrap();
        assert_eq!(saved, b"[\"a\"]");
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let store = MemoryStore::new();
        let order = vec!["x".to_string(), "y".to_string(), "z".to_string()];
        save_order(&store, Path::new(ORDER_FILE), &order).await;
        assert_eq!(load_order(&store, Path::new(ORDER_FILE)).await, order);
    }

    #[tokio::test]
    async fn test_global_singleton_returns_installed_instance() {
        let store = counting(Duration::ZERO, Some("[\"global\"]")).await;
        assert!(install(loader(store)).is_ok());

        let first = acquire_singleton().await;
        let second = acquire_singleton().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.recency().await, vec!["global".to_string()]);
    }
}
