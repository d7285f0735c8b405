// HTTP Server Setup

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use leadharvest_core::application::{CancelToken, JobManager};
use leadharvest_core::error::{AppError, Result};
use leadharvest_core::port::{TimeProvider, WorkQueue};

use crate::handlers;

const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 8090;

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<JobManager>,
    pub queue: Arc<dyn WorkQueue>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub stale_claim_max_age_ms: Option<i64>,
}

/// Build the application router
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", post(handlers::start_job))
        .route("/api/jobs/:id", get(handlers::get_job))
        .route("/api/jobs/:id/terminate", post(handlers::terminate_job))
        .route("/api/queue/:stage/stats", get(handlers::queue_stats))
        .route(
            "/api/queue/:stage/recover-stale",
            post(handlers::recover_stale),
        )
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the cancellation token fires (daemon ctrl-c path)
pub async fn serve(config: HttpServerConfig, state: AppState, cancel: CancelToken) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Config(format!("cannot bind {}: {}", addr, e)))?;

    info!(addr = %addr, "HTTP API listening");

    let mut shutdown = cancel;
    axum::serve(listener, routes(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Internal(format!("http server error: {}", e)))?;

    info!("HTTP API stopped");
    Ok(())
}
