//! Job status lifecycle: states, events, and the legal transition table.
//!
//! ```text
//! pending ──start──▶ processing ──finish──▶ completed
//!    │                   │  └──mark_validation_error──▶ validation_error
//!    │                   │
//!    └──request_cancel───┴──▶ cancel_requested ──confirm_cancelled──▶ cancelled
//!                                   └──finish──▶ completed
//!
//! any ──mark_processing_error──▶ processing_error
//! validation_error | processing_error | completed ──reprocess──▶ pending
//! ```

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult, StateTransitionError};

/// Lifecycle status of a job-bearing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Initial state; waiting to be picked up.
    Pending,
    Processing,
    ValidationError,
    ProcessingError,
    Completed,
    /// Cancellation was asked for; in-flight work is expected to notice.
    CancelRequested,
    Cancelled,
}

impl JobStatus {
    /// Every status, sorted by name (for selection lists and filters).
    pub const ALL: [JobStatus; 7] = [
        JobStatus::CancelRequested,
        JobStatus::Cancelled,
        JobStatus::Completed,
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::ProcessingError,
        JobStatus::ValidationError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::ValidationError => "validation_error",
            JobStatus::ProcessingError => "processing_error",
            JobStatus::Completed => "completed",
            JobStatus::CancelRequested => "cancel_requested",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses are the only ones in which a record may be destroyed.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::ValidationError
                | JobStatus::ProcessingError
                | JobStatus::Completed
                | JobStatus::Cancelled
        )
    }

    /// Pending or processing.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Processing)
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> DomainResult<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::UnknownStatus(s.to_string()))
    }
}

/// Named, guarded status changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobEvent {
    Start,
    MarkValidationError,
    MarkProcessingError,
    Finish,
    Reprocess,
    RequestCancel,
    ConfirmCancelled,
}

impl JobEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            JobEvent::Start => "start",
            JobEvent::MarkValidationError => "mark_validation_error",
            JobEvent::MarkProcessingError => "mark_processing_error",
            JobEvent::Finish => "finish",
            JobEvent::Reprocess => "reprocess",
            JobEvent::RequestCancel => "request_cancel",
            JobEvent::ConfirmCancelled => "confirm_cancelled",
        }
    }
}

impl core::fmt::Display for JobEvent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The transition table for [`JobStatus`].
///
/// Pure and deterministic: callers persist the resulting status themselves
/// (conditionally on the source statuses from [`StatusMachine::sources`]).
#[derive(Debug, Clone, Copy)]
pub struct StatusMachine;

impl StatusMachine {
    /// Statuses from which `event` may fire.
    pub fn sources(event: JobEvent) -> &'static [JobStatus] {
        use JobStatus::*;
        match event {
            JobEvent::Start => &[Pending],
            JobEvent::MarkValidationError => &[Processing],
            JobEvent::MarkProcessingError => &JobStatus::ALL,
            JobEvent::Finish => &[Processing, CancelRequested],
            JobEvent::Reprocess => &[ValidationError, ProcessingError, Completed],
            JobEvent::RequestCancel => &[Pending, Processing],
            JobEvent::ConfirmCancelled => &[CancelRequested],
        }
    }

    /// Status reached by `event`.
    pub fn target(event: JobEvent) -> JobStatus {
        match event {
            JobEvent::Start => JobStatus::Processing,
            JobEvent::MarkValidationError => JobStatus::ValidationError,
            JobEvent::MarkProcessingError => JobStatus::ProcessingError,
            JobEvent::Finish => JobStatus::Completed,
            JobEvent::Reprocess => JobStatus::Pending,
            JobEvent::RequestCancel => JobStatus::CancelRequested,
            JobEvent::ConfirmCancelled => JobStatus::Cancelled,
        }
    }

    pub fn can_fire(from: JobStatus, event: JobEvent) -> bool {
        Self::sources(event).contains(&from)
    }

    /// Compute the status `event` leads to from `from`.
    pub fn next(from: JobStatus, event: JobEvent) -> Result<JobStatus, StateTransitionError> {
        if Self::can_fire(from, event) {
            Ok(Self::target(event))
        } else {
            Err(StateTransitionError { event, from })
        }
    }
}
