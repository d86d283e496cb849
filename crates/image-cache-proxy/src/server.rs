//! HTTP server for the image cache
//!
//! Provides /health, /image/{*key} and DELETE /cache endpoints.

use crate::error::{ProxyError, Result};
use crate::types::{HealthResponse, ImageQuery};
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get},
    Router,
};
use chrono::{DateTime, Utc};
use lru_image_cache::{CacheLoader, Handler, ImageSource};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state for the HTTP server
pub struct ServerState {
    pub loader: Arc<CacheLoader>,
    pub wait_timeout: Duration,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(loader: Arc<CacheLoader>, wait_timeout: Duration) -> Self {
        Self {
            loader,
            wait_timeout,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Error response
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/image/{*key}", get(get_image))
        .route("/cache", delete(clear_cache))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(state: SharedState, port: u16) -> std::io::Result<()> {
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let cache = state.loader.acquire().await;
    let uptime_secs = (Utc::now() - state.started_at).num_seconds() as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: cache.stats().await,
    })
}

/// Get an image by its cache key
async fn get_image(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(query): Query<ImageQuery>,
) -> Response {
    let mutable = query.mutable.unwrap_or(false);
    match resolve_image(&state, &key, mutable).await {
        Ok(data) => (
            [
                (header::CONTENT_TYPE, content_type_for(&key)),
                (header::CACHE_CONTROL, "public, max-age=86400"),
            ],
            data,
        )
            .into_response(),
        Err(e) => {
            warn!(key = %key, error = %e, "Failed to resolve image");
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: "Image not found".to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Drop every cached image
async fn clear_cache(State(state): State<SharedState>) -> StatusCode {
    state.loader.acquire().await.clear().await;
    StatusCode::NO_CONTENT
}

/// Register for `key`, wait for its local path and read the bytes
async fn resolve_image(state: &ServerState, key: &str, mutable: bool) -> Result<Vec<u8>> {
    let cache = state.loader.acquire().await;

    let (tx, rx) = oneshot::channel::<PathBuf>();
    let slot = Mutex::new(Some(tx));
    let handler = Handler::new(move |path| {
        if let Some(tx) = slot.lock().ok().and_then(|mut slot| slot.take()) {
            let _ = tx.send(path.to_path_buf());
        }
    });

    // The download keeps running even if this request gives up waiting
    {
        let cache = cache.clone();
        let key = key.to_string();
        let handler = handler.clone();
        tokio::spawn(async move {
            cache.on(&key, ImageSource::remote(), handler, !mutable).await;
        });
    }

    // The handler stays registered until the read is done so the object
    // cannot be evicted in between
    let result = match tokio::time::timeout(state.wait_timeout, rx).await {
        Ok(Ok(path)) => cache.read_object(&path).await.map_err(ProxyError::from),
        _ => Err(ProxyError::NotResolved(key.to_string())),
    };
    cache.dispose(key, &handler).await;

    result
}

fn content_type_for(key: &str) -> &'static str {
    let extension = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}
