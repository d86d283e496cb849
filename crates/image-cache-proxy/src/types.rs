//! Core types for the image cache proxy

use lru_image_cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the HTTP front
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub port: u16,
    /// How long a request waits for its image to resolve
    pub wait_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            wait_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ImageQuery {
    pub mutable: Option<bool>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
