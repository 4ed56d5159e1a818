//! Social login demo
//!
//! Logs a user in through Facebook's OAuth2 flow and renders their profile
//! from the Graph API.

mod config;
mod error;
mod graph;
mod routes;
mod types;

use crate::config::Config;
use crate::error::Result;
use crate::graph::GraphClient;
use crate::routes::{create_router, AppState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("social_login_demo=info".parse()?);

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

    let config = Config::from_env();
    info!("Starting social login demo on port {}", config.port);
    info!("Redirect URL: {}", config.redirect_url);
    if config.app_id.is_empty() || config.app_secret.is_empty() {
        warn!("FB_APP_ID or FB_APP_SECRET is not set, logins will fail");
    }

    let state = AppState {
        graph: Arc::new(GraphClient::new(&config)?),
    };
    let router = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);
    axum::serve(listener, router).await?;

    Ok(())
}
