// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use axum::{routing::{get, post}, Router};
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::application::explorer_service::ExplorerService;
use crate::infrastructure::config::{load_backend_config, load_metrics_config};
use crate::infrastructure::http_query_runner::HttpQueryRunner;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    filter_entities, health_check, load_metrics, metrics_snapshot, query_series,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let backend_config = load_backend_config()?;
    let metrics_config = load_metrics_config()?;

    // Create query runner (infrastructure layer)
    let runner = Arc::new(HttpQueryRunner::new(&backend_config.backend));

    // Create services (application layer)
    let explorer_service =
        ExplorerService::new(runner, metrics_config.queries, metrics_config.filter);

    let state = Arc::new(AppState { explorer_service });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/series", post(query_series))
        .route("/metrics/:kind", get(metrics_snapshot).post(load_metrics))
        .route("/filter", post(filter_entities))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = backend_config.server.bind.parse()?;
    tracing::info!("Starting signals-explorer service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
