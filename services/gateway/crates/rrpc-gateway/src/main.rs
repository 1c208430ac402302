//! Gateway entry point.
//!
//! Initialises tracing, discovers Redis pools from `REDIS_*` environment
//! variables, loads gateway-specific configuration from `GATEWAY_*`
//! variables, and serves the JSON-RPC + key-search HTTP API.

mod config;
mod handlers;
mod state;

use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("rrpc-gateway starting");

    let config: Config = envy::prefixed("GATEWAY_")
        .from_env()
        .context("failed to load config from GATEWAY_* env vars")?;

    let pools = rrpc_pool::read_pools_from_env(std::env::vars())
        .context("failed to read REDIS_* pool configuration")?;
    let service_pool = config
        .service_pool
        .clone()
        .unwrap_or_else(|| pools.first().map(|p| p.name.clone()).unwrap_or_else(|| "redis_0".to_string()));

    tracing::info!(
        listen_addr = %config.listen_addr,
        pools = ?pools.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
        service_pool = %service_pool,
        "configuration loaded",
    );

    let registry = Arc::new(rrpc_pool::PoolRegistry::new(pools));
    let state = Arc::new(AppState::new(registry, service_pool));

    let router = Router::new()
        .route("/", post(handlers::rpc))
        .route("/status", get(handlers::status))
        .route("/inspect", get(handlers::inspect))
        .route("/keys/paginate/{redis_name}", post(handlers::search))
        .route("/keys/paginate/refresh-ttl/{search_id}", post(handlers::refresh_ttl))
        .route("/keys/paginate/info/{search_id}", get(handlers::search_info))
        .route("/keys/paginate/{search_id}/page/{page_num}", get(handlers::get_page))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let addr: std::net::SocketAddr = config.listen_addr.parse().context("invalid listen address")?;
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind TCP listener")?;

    tracing::info!("rrpc-gateway ready — http://{}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(state))
        .await
        .context("HTTP server error")?;

    tracing::info!("rrpc-gateway shut down");
    Ok(())
}

async fn shutdown_signal(state: Arc<AppState>) {
    tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
    tracing::info!("received shutdown signal, closing Redis pools");
    state.registry.close_all().await;
}
