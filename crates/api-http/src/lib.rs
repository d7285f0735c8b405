// Leadharvest HTTP API
//
// Thin axum surface over the job manager and the work queue; localhost
// binding by default, JSON bodies everywhere.

mod error;
mod handlers;
mod server;
mod types;

pub use error::ApiError;
pub use server::{routes, serve, AppState, HttpServerConfig};
pub use types::{
    JobStatusResponse, QueueStatsResponse, RecoverStaleResponse, StartJobRequest,
    StartJobResponse, TerminateResponse,
};
