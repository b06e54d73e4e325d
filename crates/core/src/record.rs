//! Job-bearing records: the subset of record state the lifecycle engine owns.

use serde::{Deserialize, Serialize};

use crate::fault::{ErrorDetail, ValidationErrors};
use crate::id::RecordId;
use crate::progress::ProgressMeter;
use crate::status::JobStatus;

/// Which configured work method an execution runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformMethod {
    Process,
    Reprocess,
}

impl PerformMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PerformMethod::Process => "process",
            PerformMethod::Reprocess => "reprocess",
        }
    }
}

impl core::fmt::Display for PerformMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle fields embedded in an application record.
///
/// A mirror of the persisted row. The engine moves `status` only after the
/// store accepted the write (or after the fallback write), through
/// [`JobState::overwrite_status`]. Progress is read from the store's live
/// meter, never from the copy kept here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    status: JobStatus,
    error_detail: ErrorDetail,
    duration_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    progress_meter: Option<ProgressMeter>,
    /// Validation failures gathered by application code; never persisted.
    #[serde(skip)]
    errors: ValidationErrors,
}

impl JobState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from persisted fields.
    pub fn restore(
        status: JobStatus,
        error_detail: ErrorDetail,
        duration_total: Option<f64>,
        progress_meter: Option<ProgressMeter>,
    ) -> Self {
        Self {
            status,
            error_detail,
            duration_total,
            progress_meter,
            errors: ValidationErrors::new(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn overwrite_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    pub fn error_detail(&self) -> &ErrorDetail {
        &self.error_detail
    }

    pub fn set_error_detail(&mut self, detail: ErrorDetail) {
        self.error_detail = detail;
    }

    /// Total seconds spent executing, `None` until the first execution.
    pub fn duration_total(&self) -> Option<f64> {
        self.duration_total
    }

    pub fn set_duration_total(&mut self, seconds: f64) {
        self.duration_total = Some(seconds);
    }

    pub fn progress_meter(&self) -> Option<&ProgressMeter> {
        self.progress_meter.as_ref()
    }

    pub fn set_progress_meter(&mut self, meter: Option<ProgressMeter>) {
        self.progress_meter = meter;
    }

    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ValidationErrors {
        &mut self.errors
    }
}

/// A persisted entity the lifecycle engine is attached to.
///
/// Application types embed a [`JobState`] and expose it here; the engine never
/// touches any other field.
pub trait JobRecord: Send + 'static {
    /// Record type name, used to route queued work back to a handler.
    const KIND: &'static str;

    fn id(&self) -> RecordId;

    fn job(&self) -> &JobState;

    fn job_mut(&mut self) -> &mut JobState;
}
