//! Image Cache Proxy - HTTP front for the disk-backed LRU image cache
//!
//! Serves images by logical key, downloading each one at most once and
//! keeping the most recently used objects on local disk.

mod error;
mod server;
mod types;

use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use crate::types::ProxyConfig;
use lru_image_cache::CacheLoader;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("image_cache_proxy=info".parse()?)
        .add_directive("lru_image_cache=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting Image Cache Proxy...");

    let config = load_config();
    let loader = Arc::new(CacheLoader::from_env());
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", loader.config().cache_dir);
    info!("Order file: {:?}", loader.config().order_file);
    info!("Capacity: {} images", loader.config().capacity);
    match &loader.config().remote_base_url {
        Some(url) => info!("Remote base URL: {}", url),
        None => info!("Remote base URL: none, keys must carry full URIs"),
    }

    // Load the persisted order before taking requests
    loader.acquire().await;

    let state: SharedState = Arc::new(ServerState::new(loader, config.wait_timeout));

    // Start HTTP server (blocking)
    start_server(state, config.port).await?;

    Ok(())
}

fn load_config() -> ProxyConfig {
    let defaults = ProxyConfig::default();

    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(defaults.port);

    let wait_timeout = std::env::var("IMAGE_WAIT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(defaults.wait_timeout);

    ProxyConfig { port, wait_timeout }
}
