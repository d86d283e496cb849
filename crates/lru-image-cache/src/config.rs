use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Cache configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub cache_dir: PathBuf,
    pub order_file: PathBuf,
    /// Maximum number of tracked objects
    pub capacity: usize,
    pub remote_base_url: Option<Url>,
    pub transfer_timeout: Duration,
}

impl CacheConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cache_dir = env::var("IMAGE_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let order_file = env::var("IMAGE_CACHE_ORDER_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.order_file);

        let capacity = env::var("IMAGE_CACHE_CAPACITY")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|c| *c > 0)
            .unwrap_or(defaults.capacity);

        let remote_base_url = env::var("IMAGE_CACHE_REMOTE_URL")
            .ok()
            .and_then(|s| Url::parse(&s).ok());

        let transfer_timeout = env::var("IMAGE_CACHE_TRANSFER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.transfer_timeout);

        Self {
            cache_dir,
            order_file,
            capacity,
            remote_base_url,
            transfer_timeout,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache/images"),
            order_file: PathBuf::from("./cache/queue.json"),
            capacity: 10,
            remote_base_url: None,
            transfer_timeout: Duration::from_secs(30),
        }
    }
}
