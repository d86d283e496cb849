//! Entry bookkeeping and the download pipeline
//!
//! All mutable state sits behind one mutex that is released before any
//! backing-store or remote call, so an await never happens while it is held.
//! Handlers are called after the lock is dropped as well.

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, Handler};
use crate::error::Result;
use crate::loader;
use crate::paths::PathNaming;
use crate::policy::LruPolicy;
use crate::remote::RemoteSource;
use crate::store::BackingStore;
use crate::types::{CacheStats, ImageSource};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub type CacheHandle = Arc<ImageCache>;

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    policy: LruPolicy<String>,
    /// Bumped by `clear` so downloads started before it are discarded
    epoch: u64,
}

pub struct ImageCache {
    state: Mutex<CacheState>,
    /// Serializes order snapshots and their writes
    persist_lock: Mutex<()>,
    store: Arc<dyn BackingStore>,
    remote: Arc<dyn RemoteSource>,
    naming: PathNaming,
    capacity: usize,
    order_file: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ImageCache {
    pub fn new(
        config: &CacheConfig,
        store: Arc<dyn BackingStore>,
        remote: Arc<dyn RemoteSource>,
    ) -> Self {
        Self::with_policy(config, store, remote, LruPolicy::new())
    }

    pub fn with_policy(
        config: &CacheConfig,
        store: Arc<dyn BackingStore>,
        remote: Arc<dyn RemoteSource>,
        policy: LruPolicy<String>,
    ) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                policy,
                epoch: 0,
            }),
            persist_lock: Mutex::new(()),
            store,
            remote,
            naming: PathNaming::new(&config.cache_dir),
            capacity: config.capacity.max(1),
            order_file: config.order_file.clone(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Register `handler` for `key` and start resolving it
    ///
    /// The same handler registered twice is called twice.
    pub async fn on(&self, key: &str, source: ImageSource, handler: Handler, immutable: bool) {
        {
            let mut state = self.state.lock().await;
            match state.entries.get_mut(key) {
                Some(entry) => entry.handlers.push(handler),
                None => {
                    debug!(key, "New cache entry");
                    let path = self.initial_path(key, &source, immutable);
                    state
                        .entries
                        .insert(key.to_string(), CacheEntry::new(source, handler, immutable, path));
                }
            }
        }
        self.get(key).await;
    }

    /// Stop calling `handler` for `key`; in-flight downloads keep running
    ///
    /// An entry left without handlers that the policy does not track is
    /// forgotten, as long as registering the key again would rebuild it
    /// unchanged. Tracked entries stay until evicted.
    pub async fn dispose(&self, key: &str, handler: &Handler) {
        let mut state = self.state.lock().await;
        let CacheState {
            entries, policy, ..
        } = &mut *state;
        let Some(entry) = entries.get_mut(key) else {
            return;
        };
        entry.remove_handler(handler);

        let rebuildable = entry.path.is_none()
            || entry.path == self.initial_path(key, &entry.source, entry.immutable);
        if !entry.has_handlers() && !entry.downloading && rebuildable && !policy.contains(key) {
            debug!(key, "Dropping unused entry");
            entries.remove(key);
        }
    }

    pub async fn get(&self, key: &str) {
        let (path, is_local) = {
            let state = self.state.lock().await;
            match state.entries.get(key) {
                Some(entry) => (entry.path.clone(), entry.source.is_local),
                None => return,
            }
        };

        if let Some(path) = path {
            // The platform may purge cached files behind our back
            if self.store.exists(&path).await {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "Cache hit");
                self.notify(key, is_local).await;
                return;
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.download(key).await;
    }

    /// Fetch the object for `key`, at most one transfer per entry at a time
    pub async fn download(&self, key: &str) {
        let source = {
            let state = self.state.lock().await;
            match state.entries.get(key) {
                Some(entry) => entry.source.clone(),
                None => return,
            }
        };

        let uri = match self.remote.resolve(key, &source).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!(key, error = %e, "Failed to resolve download URI");
                return;
            }
        };

        let (dest, epoch) = {
            let mut state = self.state.lock().await;
            let epoch = state.epoch;
            let Some(entry) = state.entries.get_mut(key) else {
                return;
            };
            if entry.downloading {
                debug!(key, "Download already in flight");
                return;
            }
            entry.downloading = true;
            let dest = if entry.immutable || entry.source.is_local {
                self.naming.deterministic(key)
            } else {
                self.naming.unique(key)
            };
            (dest, epoch)
        };

        debug!(key, url = %uri, dest = ?dest, "Downloading");
        let result = self
            .remote
            .transfer(&uri, &dest, &source.method, &source.headers)
            .await;

        let (live, claimed) = {
            let mut state = self.state.lock().await;
            let current_epoch = state.epoch == epoch;
            match state.entries.get_mut(key) {
                Some(entry) if current_epoch => {
                    entry.downloading = false;
                    if result.is_ok() {
                        entry.path = Some(dest.clone());
                    }
                    (true, false)
                }
                // Registered again after a clear or eviction, possibly at the same path
                Some(entry) => (false, self.claims(key, entry, &dest)),
                None => (false, false),
            }
        };

        match result {
            Ok(()) if live => {
                debug!(key, "Download finished");
                self.notify(key, false).await;
            }
            Ok(()) if claimed => {
                debug!(key, "Entry replaced during download, file belongs to the new entry");
            }
            Ok(()) => {
                debug!(key, "Entry dropped during download, discarding file");
                self.delete_file(&dest).await;
            }
            Err(e) => {
                warn!(key, error = %e, "Download failed");
                // Part of the body may already be on disk
                if !claimed {
                    self.delete_file(&dest).await;
                }
            }
        }
    }

    /// Whether `entry` resolves to `dest`, now or once its own download lands
    fn claims(&self, key: &str, entry: &CacheEntry, dest: &Path) -> bool {
        entry.path.as_deref() == Some(dest)
            || ((entry.immutable || entry.source.is_local) && self.naming.deterministic(key) == dest)
    }

    /// Call every handler with the entry's path, then record the access
    ///
    /// Local objects are not stored in the cache directory and stay out of
    /// the recency policy.
    pub async fn notify(&self, key: &str, is_local: bool) {
        let (handlers, path) = {
            let state = self.state.lock().await;
            match state.entries.get(key) {
                Some(CacheEntry {
                    handlers,
                    path: Some(path),
                    ..
                }) => (handlers.clone(), path.clone()),
                _ => return,
            }
        };

        for handler in &handlers {
            handler.call(&path);
        }

        if !is_local {
            self.update(key).await;
        }
    }

    /// Record an access to `key`, evicting when the cache is full
    pub async fn update(&self, key: &str) {
        let evicted = {
            let mut state = self.state.lock().await;
            let CacheState {
                entries, policy, ..
            } = &mut *state;
            let key = key.to_string();

            if policy.contains(&key) {
                policy.touch(&key);
                None
            } else {
                let mut evicted = None;
                if policy.len() >= self.capacity {
                    let victim = policy
                        .eviction_candidate(|k| entries.get(k).is_some_and(CacheEntry::has_handlers))
                        .cloned();
                    match victim {
                        Some(victim) => {
                            policy.remove(&victim);
                            let entry = entries.remove(&victim);
                            let path = match entry {
                                Some(entry) if entry.source.is_local => None,
                                Some(CacheEntry {
                                    path: Some(path), ..
                                }) => Some(path),
                                _ => Some(self.naming.deterministic(&victim)),
                            };
                            evicted = Some((victim, path));
                        }
                        None => debug!(
                            tracked = policy.len(),
                            "Every tracked entry is in use, skipping eviction"
                        ),
                    }
                }
                policy.add(key);
                evicted
            }
        };

        if let Some((victim, path)) = evicted {
            info!(key = %victim, "Evicted least recently used entry");
            if let Some(path) = path {
                self.delete_file(&path).await;
            }
        }

        self.persist().await;
    }

    /// Delete every cached file and forget all entries and recency state
    pub async fn clear(&self) {
        {
            let mut state = self.state.lock().await;
            state.entries.clear();
            state.policy = LruPolicy::new();
            state.epoch += 1;
        }
        if let Err(e) = self.store.delete(self.naming.base_dir()).await {
            warn!(cache_dir = ?self.naming.base_dir(), error = %e, "Failed to delete cache directory");
        }
        self.persist().await;
        info!("Image cache cleared");
    }

    pub async fn read_object(&self, path: &Path) -> Result<Vec<u8>> {
        self.store.read(path).await
    }

    pub async fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.state.lock().await.entries.get(key).cloned()
    }

    /// Tracked keys, most recently used first
    pub async fn recency(&self) -> Vec<String> {
        self.state.lock().await.policy.to_ordered_sequence()
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        CacheStats {
            entries: state.entries.len(),
            tracked: state.policy.len(),
            capacity: self.capacity,
            downloading: state.entries.values().filter(|e| e.downloading).count(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn initial_path(&self, key: &str, source: &ImageSource, immutable: bool) -> Option<PathBuf> {
        if source.is_local {
            Some(PathBuf::from(key))
        } else if immutable {
            Some(self.naming.deterministic(key))
        } else {
            None
        }
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let order = self.state.lock().await.policy.serialize();
        loader::save_order(self.store.as_ref(), &self.order_file, &order).await;
    }

    async fn delete_file(&self, path: &Path) {
        if let Err(e) = self.store.delete(path).await {
            warn!(path = ?path, error = %e, "Failed to delete cached file");
        }
    }
}
