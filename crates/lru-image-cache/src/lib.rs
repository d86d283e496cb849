//! Disk-backed LRU cache for remotely sourced images
//!
//! Objects are keyed by a logical path, downloaded once per key even when
//! many consumers ask concurrently, and evicted least-recently-used first
//! once the configured object count is reached. Entries that still have
//! registered handlers are never evicted. The recency order survives restarts
//! in a small JSON file.
//!
//! ```no_run
//! use lru_image_cache::{acquire_singleton, Handler, ImageSource};
//!
//! # async fn run() {
//! let cache = acquire_singleton().await;
//! let handler = Handler::new(|path| println!("ready at {}", path.display()));
//! cache.on("users/1/avatar.png", ImageSource::remote(), handler.clone(), true).await;
//! cache.dispose("users/1/avatar.png", &handler).await;
//! # }
//! ```

mod cache;
mod config;
mod entry;
mod error;
mod loader;
mod paths;
mod policy;
mod queue;
mod remote;
mod store;
mod types;

#[cfg(test)]
mod testutil;

pub use cache::{CacheHandle, ImageCache};
pub use config::CacheConfig;
pub use entry::{CacheEntry, Handler};
pub use error::{CacheError, Result};
pub use loader::{acquire_singleton, install, load_order, save_order, CacheLoader, LoaderState};
pub use paths::PathNaming;
pub use policy::LruPolicy;
pub use queue::{NodeId, RecencyQueue};
pub use remote::{HttpRemote, RemoteSource};
pub use store::{BackingStore, FsStore, MemoryStore};
pub use types::{CacheStats, ImageSource};
pub use url::Url;
