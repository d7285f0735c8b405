// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid work item status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Unknown work item status: {0}")]
    UnknownStatus(String),

    #[error("Unknown stage: {0}")]
    UnknownStage(String),

    #[error("Unknown job kind: {0}")]
    UnknownJobKind(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
