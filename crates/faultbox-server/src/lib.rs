//! Faultbox HTTP server.
//!
//! Serves user records through the cache-aside store and exposes the fault
//! registry for remote control.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use faultbox_config::ServerConfig;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod error;
pub mod routes;
pub mod service;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use service::{FaultSelector, Sandbox};
pub use state::AppState;

/// Builds the application router.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        // Data
        .route("/api/users", get(routes::users::get_users))
        .route("/health", get(routes::users::health))
        // Fault control
        .route("/faults/status", get(routes::faults::status))
        .route("/faults/active", get(routes::faults::active))
        .route("/faults/stop-all", post(routes::faults::stop_all))
        .route("/faults/{name}/start", post(routes::faults::start))
        .route("/faults/{name}/stop", post(routes::faults::stop))
        // Fallback
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves until `shutdown` resolves, then drains in-flight requests.
pub async fn run_server(
    config: &ServerConfig,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.bind_address))?;

    let app = router(state, config.request_timeout());
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %listener.local_addr()?, "faultbox listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("server drained");
    Ok(())
}
