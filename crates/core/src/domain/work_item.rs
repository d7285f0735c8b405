// Work Item Domain Model
//
// A WorkItem is one claimable unit in the durable queue: a postcode subsector
// waiting for business discovery, or a business website waiting for email
// harvesting. Status strings are stored as-is in the queue store, so the enum
// round-trips through its wire form.

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Work item ID (UUID v4)
pub type WorkItemId = String;

/// Pipeline stage that consumes a work item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    BusinessDiscovery,
    EmailHarvest,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::BusinessDiscovery => "business_discovery",
            Stage::EmailHarvest => "email_harvest",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "business_discovery" => Ok(Stage::BusinessDiscovery),
            "email_harvest" => Ok(Stage::EmailHarvest),
            other => Err(DomainError::UnknownStage(other.to_string())),
        }
    }
}

/// Reason component of a `failed_<reason>` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    CircuitBreaker,
    DomainUnreachable,
    CollaboratorCrashed,
    Unexpected,
    Other(String),
}

impl FailureReason {
    fn suffix(&self) -> &str {
        match self {
            FailureReason::CircuitBreaker => "circuit_breaker",
            FailureReason::DomainUnreachable => "domain_unreachable",
            FailureReason::CollaboratorCrashed => "collaborator_crashed",
            FailureReason::Unexpected => "unexpected",
            FailureReason::Other(s) => s,
        }
    }

    fn from_suffix(s: &str) -> Self {
        match s {
            "circuit_breaker" => FailureReason::CircuitBreaker,
            "domain_unreachable" => FailureReason::DomainUnreachable,
            "collaborator_crashed" => FailureReason::CollaboratorCrashed,
            "unexpected" => FailureReason::Unexpected,
            other => FailureReason::Other(other.to_string()),
        }
    }
}

/// Reason component of a `skipped_<reason>` status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    InvalidTarget,
    Shutdown,
    Other(String),
}

impl SkipReason {
    fn suffix(&self) -> &str {
        match self {
            SkipReason::InvalidTarget => "invalid_target",
            SkipReason::Shutdown => "shutdown",
            SkipReason::Other(s) => s,
        }
    }

    fn from_suffix(s: &str) -> Self {
        match s {
            "invalid_target" => SkipReason::InvalidTarget,
            "shutdown" => SkipReason::Shutdown,
            other => SkipReason::Other(other.to_string()),
        }
    }
}

/// Work item status
///
/// Valid transitions: `pending -> processing -> terminal`, plus
/// `processing -> pending` via stale-claim recovery. Nothing else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum WorkStatus {
    Pending,
    Processing,
    Found,
    CheckedNoEmail,
    Failed(FailureReason),
    Skipped(SkipReason),
}

impl WorkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkStatus::Pending | WorkStatus::Processing)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, WorkStatus::Failed(_))
    }
}

impl std::fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkStatus::Pending => f.write_str("pending"),
            WorkStatus::Processing => f.write_str("processing"),
            WorkStatus::Found => f.write_str("found"),
            WorkStatus::CheckedNoEmail => f.write_str("checked_no_email"),
            WorkStatus::Failed(r) => write!(f, "failed_{}", r.suffix()),
            WorkStatus::Skipped(r) => write!(f, "skipped_{}", r.suffix()),
        }
    }
}

impl std::str::FromStr for WorkStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(WorkStatus::Pending),
            "processing" => Ok(WorkStatus::Processing),
            "found" => Ok(WorkStatus::Found),
            "checked_no_email" => Ok(WorkStatus::CheckedNoEmail),
            other => {
                if let Some(rest) = other.strip_prefix("failed_") {
                    Ok(WorkStatus::Failed(FailureReason::from_suffix(rest)))
                } else if let Some(rest) = other.strip_prefix("skipped_") {
                    Ok(WorkStatus::Skipped(SkipReason::from_suffix(rest)))
                } else {
                    Err(DomainError::UnknownStatus(other.to_string()))
                }
            }
        }
    }
}

impl From<WorkStatus> for String {
    fn from(s: WorkStatus) -> String {
        s.to_string()
    }
}

impl TryFrom<String> for WorkStatus {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// Work Item Entity (a document in the durable queue)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub stage: Stage,
    pub target: String,
    pub label: Option<String>,
    pub status: WorkStatus,
    /// Structured result (e.g. harvested emails); `[]` until terminal
    pub result_payload: serde_json::Value,
    pub claimed_at: Option<i64>,
    pub error_detail: Option<String>,
    pub recovery_note: Option<String>,
    pub created_at: i64, // epoch ms
    pub updated_at: i64,
}

impl WorkItem {
    /// Create a new pending item with explicit ID and timestamp
    /// (injected, not generated - see IdProvider/TimeProvider)
    pub fn new(
        id: impl Into<String>,
        stage: Stage,
        target: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            id: id.into(),
            stage,
            target: target.into(),
            label: None,
            status: WorkStatus::Pending,
            result_payload: serde_json::Value::Array(vec![]),
            claimed_at: None,
            error_detail: None,
            recovery_note: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// DNS domain of the target, if the target parses as a URL.
    ///
    /// Targets without a scheme are treated as `https://<target>`; a leading
    /// `www.` is stripped so the circuit breaker keys match across variants.
    pub fn domain(&self) -> Option<String> {
        let raw = self.target.trim();
        if raw.is_empty() {
            return None;
        }
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };
        let parsed = url::Url::parse(&candidate).ok()?;
        let host = parsed.host_str()?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        if host.is_empty() || !host.contains('.') {
            return None;
        }
        Some(host.to_ascii_lowercase())
    }

    /// Transition to `processing` with explicit timestamp
    pub fn claim(&mut self, now_millis: i64) -> Result<()> {
        if self.status != WorkStatus::Pending {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: WorkStatus::Processing.to_string(),
            });
        }
        self.status = WorkStatus::Processing;
        self.claimed_at = Some(now_millis);
        self.updated_at = now_millis;
        Ok(())
    }

    /// Record a terminal outcome (only valid from `processing`)
    pub fn finish(
        &mut self,
        status: WorkStatus,
        result_payload: serde_json::Value,
        error_detail: Option<String>,
        now_millis: i64,
    ) -> Result<()> {
        if self.status != WorkStatus::Processing || !status.is_terminal() {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: status.to_string(),
            });
        }
        self.status = status;
        self.result_payload = result_payload;
        self.error_detail = error_detail;
        self.claimed_at = None;
        self.updated_at = now_millis;
        Ok(())
    }

    /// Return a stale claim to `pending` (recovery sweep only)
    pub fn release(&mut self, note: impl Into<String>, now_millis: i64) -> Result<()> {
        if self.status != WorkStatus::Processing {
            return Err(DomainError::InvalidStatusTransition {
                from: self.status.to_string(),
                to: WorkStatus::Pending.to_string(),
            });
        }
        self.status = WorkStatus::Pending;
        self.claimed_at = None;
        self.recovery_note = Some(note.into());
        self.updated_at = now_millis;
        Ok(())
    }
}
