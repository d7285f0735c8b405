// HTTP route handlers

use axum::extract::{Path, State};
use axum::Json;

use leadharvest_core::application::StaleClaimSweeper;
use leadharvest_core::domain::{JobKind, JobParams, Stage};
use leadharvest_core::error::AppError;

use crate::error::ApiError;
use crate::server::AppState;
use crate::types::{
    JobStatusResponse, QueueStatsResponse, RecoverStaleResponse, StartJobRequest,
    StartJobResponse, TerminateResponse,
};

/// POST /api/jobs - Start a job
pub async fn start_job(
    State(state): State<AppState>,
    Json(req): Json<StartJobRequest>,
) -> Result<Json<StartJobResponse>, ApiError> {
    let kind: JobKind = req
        .kind
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown job kind: {}", req.kind)))?;

    let params = JobParams {
        area: req.area,
        category: req.category,
        limit: req.limit,
        chain: req.chain,
    };
    let job_id = state.manager.start(kind, params)?;
    let snapshot = state.manager.status(&job_id)?;

    Ok(Json(StartJobResponse {
        job_id,
        kind: kind.to_string(),
        status: snapshot.status.to_string(),
    }))
}

/// GET /api/jobs/:id - Job snapshot with progress figures
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>, ApiError> {
    let snapshot = state.manager.status(&job_id)?;
    let now = state.time_provider.now_millis();
    Ok(Json(JobStatusResponse::from_snapshot(snapshot, now)))
}

/// POST /api/jobs/:id/terminate - Request cooperative termination
pub async fn terminate_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<TerminateResponse>, ApiError> {
    let snapshot = state.manager.terminate(&job_id)?;
    Ok(Json(TerminateResponse {
        job_id: snapshot.job_id,
        status: snapshot.status.to_string(),
        stats: snapshot.stats,
    }))
}

/// GET /api/queue/:stage/stats - Per-status queue counters
pub async fn queue_stats(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<Json<QueueStatsResponse>, ApiError> {
    let stage: Stage = stage
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown stage: {}", stage)))?;
    let stats = state.queue.stats(stage).await?;
    Ok(Json(QueueStatsResponse {
        stage: stage.to_string(),
        stats,
    }))
}

/// POST /api/queue/:stage/recover-stale - Release abandoned claims
pub async fn recover_stale(
    State(state): State<AppState>,
    Path(stage): Path<String>,
) -> Result<Json<RecoverStaleResponse>, ApiError> {
    let stage: Stage = stage
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown stage: {}", stage)))?;
    let sweeper = StaleClaimSweeper::new(
        state.queue.clone(),
        state.time_provider.clone(),
        state.stale_claim_max_age_ms,
    );
    let recovered = sweeper.recover_stale(stage).await?;
    Ok(Json(RecoverStaleResponse {
        stage: stage.to_string(),
        recovered,
    }))
}

/// GET /health - Liveness probe
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": leadharvest_core::VERSION,
    }))
}
