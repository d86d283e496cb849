//! Remote object resolution and transfer

use crate::error::{CacheError, Result};
use crate::store::{BackingStore, FsStore};
use crate::types::ImageSource;
use async_trait::async_trait;
use reqwest::{Client, Method};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Turn a key and its source descriptor into a transport URI
    async fn resolve(&self, key: &str, source: &ImageSource) -> Result<Url>;

    /// Fetch `uri` and store the body at `dest`
    async fn transfer(
        &self,
        uri: &Url,
        dest: &Path,
        method: &str,
        headers: &[(String, String)],
    ) -> Result<()>;
}

/// HTTP client for fetching cached objects
pub struct HttpRemote {
    client: Client,
    base_url: Option<Url>,
}

impl HttpRemote {
    pub fn new(base_url: Option<Url>, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
                Client::new()
            });
        Self::with_client(client, base_url)
    }

    /// Use a preconfigured client, e.g. one with custom TLS or proxy settings
    pub fn with_client(client: Client, base_url: Option<Url>) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl RemoteSource for HttpRemote {
    async fn resolve(&self, key: &str, source: &ImageSource) -> Result<Url> {
        if let Some(uri) = &source.uri {
            return Ok(Url::parse(uri)?);
        }

        let base = self.base_url.as_ref().ok_or_else(|| {
            CacheError::Resolution(format!("No URI for {} and no remote base URL", key))
        })?;

        let url = base.join(key.trim_start_matches('/'))?;
        debug!(key, url = %url, "Resolved remote URL");
        Ok(url)
    }

    async fn transfer(
        &self,
        uri: &Url,
        dest: &Path,
        method: &str,
        headers: &[(String, String)],
    ) -> Result<()> {
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| CacheError::Transfer(format!("Invalid method {}: {}", method, e)))?;

        let mut request = self.client.request(method, uri.clone());
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        debug!(url = %uri, dest = ?dest, "Fetching remote object");
        let response = request.send().await?;

        if !response.status().is_success() {
            warn!(status = %response.status(), url = %uri, "Failed to fetch remote object");
            return Err(CacheError::Transfer(format!(
                "Remote returned status {}",
                response.status()
            )));
        }

        let data = response.bytes().await?;

        // Lands under its final name only once the whole body is on disk
        FsStore.write(dest, &data).await?;

        debug!(size = data.len(), dest = ?dest, "Stored remote object");
        Ok(())
    }
}
