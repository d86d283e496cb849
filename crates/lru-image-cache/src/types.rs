//! Core types for the image cache

use serde::{Deserialize, Serialize};

/// Where a cached object comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    /// Explicit transport URI; resolved against the remote base URL when unset
    pub uri: Option<String>,
    /// The object already lives on the local file system at the key path
    pub is_local: bool,
    pub method: String,
    pub headers: Vec<(String, String)>,
}

impl ImageSource {
    pub fn remote() -> Self {
        Self::default()
    }

    pub fn local() -> Self {
        Self {
            is_local: true,
            ..Self::default()
        }
    }

    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        Self {
            uri: None,
            is_local: false,
            method: "GET".to_string(),
            headers: Vec::new(),
        }
    }
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub tracked: usize,
    pub capacity: usize,
    pub downloading: usize,
    pub hits: u64,
    pub misses: u64,
}
