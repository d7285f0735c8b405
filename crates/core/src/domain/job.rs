// Job Domain Model
//
// A job is one run of a pipeline stage (or a workflow chaining them).
// Jobs live in memory while running and are snapshotted to the job store,
// so restarts can report historical runs.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4)
pub type JobId = String;

/// What a job runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Expand a postcode area into subsectors queued for business discovery
    PostcodeDiscovery,
    /// Discover businesses in queued postcode subsectors
    BusinessDiscovery,
    /// Harvest emails from queued business websites
    EmailHarvest,
    /// Run the whole pipeline as chained child jobs
    Workflow,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::PostcodeDiscovery => "postcode_discovery",
            JobKind::BusinessDiscovery => "business_discovery",
            JobKind::EmailHarvest => "email_harvest",
            JobKind::Workflow => "workflow",
        }
    }

    /// Kind started as a chained child once this kind completes, if any
    pub fn chain_successor(&self) -> Option<JobKind> {
        match self {
            JobKind::PostcodeDiscovery => Some(JobKind::BusinessDiscovery),
            JobKind::BusinessDiscovery => Some(JobKind::EmailHarvest),
            JobKind::EmailHarvest | JobKind::Workflow => None,
        }
    }

    /// Does this kind require an `area` param?
    pub fn requires_area(&self) -> bool {
        matches!(self, JobKind::PostcodeDiscovery | JobKind::Workflow)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "postcode_discovery" => Ok(JobKind::PostcodeDiscovery),
            "business_discovery" => Ok(JobKind::BusinessDiscovery),
            "email_harvest" => Ok(JobKind::EmailHarvest),
            "workflow" => Ok(JobKind::Workflow),
            other => Err(DomainError::UnknownJobKind(other.to_string())),
        }
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Terminating,
    Completed,
    Failed,
    Terminated,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Terminated
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Starting => "starting",
            JobStatus::Running => "running",
            JobStatus::Terminating => "terminating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Caller-supplied parameters for a job
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobParams {
    /// Postcode area to expand (business discovery / workflow)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    /// Business category filter passed to the discovery collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Cap on items processed in this run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    /// Start the successor kind as a child job when this one drains
    #[serde(default)]
    pub chain: bool,
}

/// Live counters for one run, aggregated across batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub processed: u64,
    pub found: u64,
    pub checked_no_email: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Items the run inserted into the queue (discovered businesses, subsectors)
    pub results_collected: u64,
}

/// Point-in-time view of a job, as persisted and served over the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub kind: JobKind,
    pub status: JobStatus,
    pub stats: RunStats,
    /// Items claimable when the run started, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_targets: Option<u64>,
    pub started_at: i64, // epoch ms
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Chained follow-up job, when `params.chain` fired or kind is workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_job_id: Option<JobId>,
    pub params: JobParams,
}

impl JobSnapshot {
    pub fn new(job_id: impl Into<String>, kind: JobKind, params: JobParams, now_millis: i64) -> Self {
        Self {
            job_id: job_id.into(),
            kind,
            status: JobStatus::Starting,
            stats: RunStats::default(),
            total_targets: None,
            started_at: now_millis,
            ended_at: None,
            error_detail: None,
            child_job_id: None,
            params,
        }
    }
}
