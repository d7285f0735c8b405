// HTTP request/response types

use serde::{Deserialize, Serialize};

use leadharvest_core::domain::{JobSnapshot, RunStats};
use leadharvest_core::port::QueueStats;

/// POST /api/jobs request body
#[derive(Debug, Clone, Deserialize)]
pub struct StartJobRequest {
    /// `postcode_discovery | business_discovery | email_harvest | workflow`
    pub kind: String,
    #[serde(default)]
    pub area: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub chain: bool,
}

/// POST /api/jobs response
#[derive(Debug, Serialize, Deserialize)]
pub struct StartJobResponse {
    pub job_id: String,
    pub kind: String,
    pub status: String,
}

/// GET /api/jobs/:id response: the persisted snapshot plus derived
/// progress figures
#[derive(Debug, Serialize, Deserialize)]
pub struct JobStatusResponse {
    #[serde(flatten)]
    pub snapshot: JobSnapshot,
    /// Wall-clock run time so far (or total, once ended)
    pub elapsed_ms: i64,
    /// Items processed per minute over the elapsed window
    pub rate_per_minute: f64,
}

impl JobStatusResponse {
    pub fn from_snapshot(snapshot: JobSnapshot, now_millis: i64) -> Self {
        let elapsed_ms = (snapshot.ended_at.unwrap_or(now_millis) - snapshot.started_at).max(0);
        let rate_per_minute = if elapsed_ms > 0 {
            snapshot.stats.processed as f64 * 60_000.0 / elapsed_ms as f64
        } else {
            0.0
        };
        Self {
            snapshot,
            elapsed_ms,
            rate_per_minute,
        }
    }
}

/// POST /api/jobs/:id/terminate response
#[derive(Debug, Serialize, Deserialize)]
pub struct TerminateResponse {
    pub job_id: String,
    pub status: String,
    pub stats: RunStats,
}

/// GET /api/queue/:stage/stats response
#[derive(Debug, Serialize, Deserialize)]
pub struct QueueStatsResponse {
    pub stage: String,
    #[serde(flatten)]
    pub stats: QueueStats,
}

/// POST /api/queue/:stage/recover-stale response
#[derive(Debug, Serialize, Deserialize)]
pub struct RecoverStaleResponse {
    pub stage: String,
    pub recovered: u64,
}
