//! HTTP server for the file-share endpoints
//!
//! Provides /health, /upload, /upload/{key} and /download/{key}.

use crate::error::AppError;
use crate::types::{HealthResponse, UploadResponse};
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use expiring_file_cache::{validate_key, ExpiringFileCache};
use object_store_client::ObjectStore;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeFile;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Shared state for the HTTP server
pub struct ServerState {
    pub cache: ExpiringFileCache,
    pub store: Arc<dyn ObjectStore>,
    pub max_upload_bytes: usize,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        cache: ExpiringFileCache,
        store: Arc<dyn ObjectStore>,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            cache,
            store,
            max_upload_bytes,
            started_at: Utc::now(),
        }
    }
}

pub type SharedState = Arc<ServerState>;

/// Create the HTTP router
pub fn create_router(state: SharedState) -> Router {
    let max_upload_bytes = state.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/upload", post(upload_generated))
        .route("/upload/{key}", post(upload_named))
        .route("/download/{key}", get(download))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the HTTP server and run until a shutdown signal arrives.
///
/// On shutdown the cache is cleaned first, then in-flight requests get
/// `grace` to finish before the server stops waiting for them.
pub async fn start_server(state: SharedState, port: u16, grace: Duration) -> std::io::Result<()> {
    let cache = state.cache.clone();
    let router = create_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let (draining_tx, draining_rx) = oneshot::channel::<()>();
    let shutdown = async move {
        shutdown_signal().await;
        info!("Shutdown signal received, cleaning cache");
        if let Err(e) = cache.clean().await {
            error!(error = %e, "Failed to clean cache");
        }
        let _ = draining_tx.send(());
    };

    let serve = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .into_future();

    let grace_elapsed = async move {
        match draining_rx.await {
            Ok(()) => tokio::time::sleep(grace).await,
            Err(_) => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = serve => {
            info!("Server stopped");
            result
        }
        _ = grace_elapsed => {
            warn!(grace_secs = grace.as_secs(), "Grace period elapsed, forcing shutdown");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0) as u64;

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs,
        cache: state.cache.stats(),
    })
}

/// POST /upload, storing the body under a freshly generated key
async fn upload_generated(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Response, AppError> {
    // v7 keys sort by creation time and are safe as file names
    let key = Uuid::now_v7().simple().to_string();
    store_upload(&state, key, body).await
}

/// POST /upload/{key}
async fn upload_named(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response, AppError> {
    validate_key(&key).map_err(AppError::from)?;
    store_upload(&state, key, body).await
}

async fn store_upload(state: &ServerState, key: String, body: Bytes) -> Result<Response, AppError> {
    let size = body.len();
    state.store.put_object(&key, body).await.map_err(|e| {
        warn!(key = %key, error = %e, "Upload failed");
        AppError::Internal(format!("put {}: {}", key, e))
    })?;

    info!(key = %key, size, "Stored upload");
    Ok((StatusCode::CREATED, Json(UploadResponse { key })).into_response())
}

/// GET /download/{key}, served from the local cache with range and
/// conditional request support
async fn download(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    request: Request,
) -> Result<Response, AppError> {
    let path = state.cache.ensure(&key).await.map_err(|e| {
        warn!(key = %key, error = %e, "Download failed");
        AppError::from(e)
    })?;

    match ServeFile::new(path).oneshot(request).await {
        Ok(response) => Ok(response.into_response()),
        Err(never) => match never {},
    }
}
