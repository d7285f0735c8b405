// Site Processor Port
// Abstraction over the external scraping collaborator (headless browser
// subprocess in production, mocks in tests).

use crate::domain::{WorkItem, WorkStatus};
use async_trait::async_trait;
use thiserror::Error;

/// An item discovered while processing (business found during discovery)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredItem {
    pub target: String,
    pub label: Option<String>,
}

/// Result of processing one work item
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    /// Terminal status to record on the item
    pub status: WorkStatus,
    /// Structured payload (harvested emails, capped by the pool)
    pub result_payload: serde_json::Value,
    pub error_detail: Option<String>,
    /// Follow-up items to enqueue for the next stage
    pub discovered: Vec<DiscoveredItem>,
}

impl ProcessOutcome {
    pub fn with_status(status: WorkStatus) -> Self {
        Self {
            status,
            result_payload: serde_json::Value::Array(vec![]),
            error_detail: None,
            discovered: Vec::new(),
        }
    }
}

/// Processing errors (collaborator-level, not per-site outcomes)
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Collaborator timeout after {0}ms")]
    Timeout(i64),

    #[error("Collaborator crashed: {0}")]
    Crashed(String),

    #[error("Invalid collaborator output: {0}")]
    InvalidOutput(String),
}

/// Site processor trait
#[async_trait]
pub trait SiteProcessor: Send + Sync {
    /// Process one claimed work item.
    ///
    /// # Errors
    /// - ProcessError::SpawnFailed if the collaborator cannot be started
    /// - ProcessError::Timeout if processing exceeds the deadline
    /// - ProcessError::Crashed if the collaborator dies mid-run
    /// - ProcessError::InvalidOutput if its output cannot be parsed
    async fn process(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::domain::{FailureReason, WorkStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock processor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Succeed with the given emails
        Found(Vec<String>),
        /// Succeed with no emails
        NoEmail,
        /// Succeed, reporting discovered follow-up targets
        Discover(Vec<String>),
        /// Return a site-level failure status
        FailStatus(FailureReason),
        /// Return a collaborator error
        Error(String),
        /// Time out
        Timeout(i64),
        /// Panic (for panic isolation testing)
        Panic(String),
        /// Sleep for N ms, then succeed with no emails
        Slow(u64),
    }

    /// Mock Site Processor for testing
    pub struct MockSiteProcessor {
        default_behavior: MockBehavior,
        per_target: Mutex<HashMap<String, MockBehavior>>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSiteProcessor {
        pub fn new(default_behavior: MockBehavior) -> Self {
            Self {
                default_behavior,
                per_target: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn new_found(emails: Vec<&str>) -> Self {
            Self::new(MockBehavior::Found(
                emails.into_iter().map(String::from).collect(),
            ))
        }

        pub fn new_no_email() -> Self {
            Self::new(MockBehavior::NoEmail)
        }

        /// Override behavior for a specific target
        pub fn set_target_behavior(&self, target: impl Into<String>, behavior: MockBehavior) {
            self.per_target
                .lock()
                .unwrap()
                .insert(target.into(), behavior);
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        /// Targets processed, in call order
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SiteProcessor for MockSiteProcessor {
        async fn process(&self, item: &WorkItem) -> Result<ProcessOutcome, ProcessError> {
            self.calls.lock().unwrap().push(item.target.clone());

            let behavior = self
                .per_target
                .lock()
                .unwrap()
                .get(&item.target)
                .cloned()
                .unwrap_or_else(|| self.default_behavior.clone());

            match behavior {
                MockBehavior::Found(emails) => Ok(ProcessOutcome {
                    status: WorkStatus::Found,
                    result_payload: serde_json::json!(emails),
                    error_detail: None,
                    discovered: Vec::new(),
                }),
                MockBehavior::NoEmail => Ok(ProcessOutcome::with_status(WorkStatus::CheckedNoEmail)),
                MockBehavior::Discover(targets) => Ok(ProcessOutcome {
                    status: WorkStatus::Found,
                    result_payload: serde_json::json!(targets),
                    error_detail: None,
                    discovered: targets
                        .into_iter()
                        .map(|t| DiscoveredItem {
                            target: t,
                            label: None,
                        })
                        .collect(),
                }),
                MockBehavior::FailStatus(reason) => {
                    let mut outcome = ProcessOutcome::with_status(WorkStatus::Failed(reason));
                    outcome.error_detail = Some("mock failure".to_string());
                    Ok(outcome)
                }
                MockBehavior::Error(msg) => Err(ProcessError::Crashed(msg)),
                MockBehavior::Timeout(ms) => Err(ProcessError::Timeout(ms)),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Slow(ms) => {
                    tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
                    Ok(ProcessOutcome::with_status(WorkStatus::CheckedNoEmail))
                }
            }
        }
    }
}
