//! Domain error model.

use thiserror::Error;

use crate::status::{JobEvent, JobStatus};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Parse failures of domain values. Storage and queue concerns belong to the
/// infra layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A status name did not match any lifecycle state.
    #[error("unknown job status: {0}")]
    UnknownStatus(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

/// A lifecycle event was fired from a status with no matching transition rule.
///
/// The status is never mutated when this is returned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("event '{event}' cannot transition from status '{from}'")]
pub struct StateTransitionError {
    pub event: JobEvent,
    pub from: JobStatus,
}
