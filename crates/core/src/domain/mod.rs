// Domain Layer - Pure business logic and entities

pub mod error;
pub mod job;
pub mod work_item;

// Re-exports
pub use error::DomainError;
pub use job::{JobId, JobKind, JobParams, JobSnapshot, JobStatus, RunStats};
pub use work_item::{FailureReason, SkipReason, Stage, WorkItem, WorkItemId, WorkStatus};
