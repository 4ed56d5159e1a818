//! File-share service
//!
//! Accepts uploads into an object store bucket and serves downloads through
//! a local disk cache whose entries expire after a period without access.

mod config;
mod error;
mod server;
mod types;

use crate::config::{Config, StoreBackend};
use crate::error::Result;
use crate::server::{start_server, ServerState, SharedState};
use expiring_file_cache::ExpiringFileCache;
use object_store_client::{ensure_bucket, MemoryObjectStore, ObjectStore, S3Client};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("file_share_server=info".parse()?)
        .add_directive("expiring_file_cache=info".parse()?);

    // Use JSON format for Cloud Logging when LOG_FORMAT=json
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

    info!("Starting file-share server...");

    let config = Config::from_env()?;
    info!("Port: {}", config.port);
    info!("Cache dir: {:?}", config.cache_dir);
    info!("Cache idle timeout: {} seconds", config.cache_idle_timeout.as_secs());
    info!("Bucket: {} ({})", config.bucket, config.region);

    let store: Arc<dyn ObjectStore> = match config.store_backend {
        StoreBackend::S3 => Arc::new(S3Client::new(config.s3_config())?),
        StoreBackend::Memory => {
            info!("Using in-memory object store");
            Arc::new(MemoryObjectStore::new(&config.bucket))
        }
    };
    ensure_bucket(store.as_ref(), &config.region).await?;

    let cache = ExpiringFileCache::new(
        config.cache_dir.clone(),
        store.clone(),
        config.cache_idle_timeout,
    );
    cache.init().await?;

    let state: SharedState = Arc::new(ServerState::new(cache, store, config.max_upload_bytes));

    // Runs until a shutdown signal; the cache is cleaned on the way out
    start_server(state, config.port, config.shutdown_grace).await?;

    Ok(())
}
