//! HTTP server for harness liveness and live statistics.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    extract::Extension,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::metrics::MetricsHandle;

// ============================================================================
// Shared State
// ============================================================================

pub struct ServerState {
    pub metrics: MetricsHandle,
}

// ============================================================================
// Router
// ============================================================================

/// Create the status API router.
pub fn create_router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(cors)
        .layer(Extension(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - Liveness probe: waits a fixed short delay, then answers
/// with an empty list.
async fn health_handler() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(Vec::<String>::new())
}

/// GET /stats - Current metrics snapshot
async fn stats_handler(Extension(state): Extension<Arc<ServerState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot().await)
}

/// Bind the status listener. A port conflict surfaces here, before any
/// workload loop is running.
pub async fn bind_listener(port: u16) -> anyhow::Result<TcpListener> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind status server on {}", addr))
}

/// Start the HTTP server on an already-bound listener.
pub async fn run_server(state: Arc<ServerState>, listener: TcpListener) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %listener.local_addr()?, "Starting status server");

    axum::serve(listener, app).await?;

    Ok(())
}
