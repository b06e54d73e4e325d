//! Durable storage for the lifecycle fields of job-bearing records.
//!
//! The store is the single source of truth for "who owns this job": status
//! changes go through [`RecordStore::transition`], a compare-and-set on the
//! persisted status, so two workers racing for the same `pending` record cannot
//! both start it.

pub mod in_memory;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stint_core::{ErrorDetail, JobStatus, MeterId, ProgressMeter, RecordId};

pub use in_memory::InMemoryRecordStore;

/// Store error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(RecordId),
    #[error("record already exists: {0}")]
    AlreadyExists(RecordId),
    #[error("progress meter not found: {0}")]
    MeterNotFound(MeterId),
    /// The conditional status write found the record in another status.
    #[error("status conflict on {id}: expected one of {expected:?}, found '{actual}'")]
    StatusConflict {
        id: RecordId,
        expected: Vec<JobStatus>,
        actual: JobStatus,
    },
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persisted lifecycle row of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: RecordId,
    pub kind: String,
    pub status: JobStatus,
    pub error_detail: ErrorDetail,
    /// Accumulated seconds keyed by duration field name.
    pub durations: HashMap<String, f64>,
}

/// Record store abstraction.
pub trait RecordStore: Send + Sync {
    /// Persist a new record row.
    fn insert(&self, record: StoredRecord) -> Result<(), StoreError>;

    fn load(&self, id: RecordId) -> Result<StoredRecord, StoreError>;

    fn status(&self, id: RecordId) -> Result<JobStatus, StoreError> {
        Ok(self.load(id)?.status)
    }

    /// Conditional status write.
    ///
    /// Sets `status = to`, and `error_detail` when one is given, in one write,
    /// but only when the persisted status is one of `from`; otherwise fails
    /// with [`StoreError::StatusConflict`] and writes nothing. `None` leaves
    /// the persisted error detail as it is.
    fn transition(
        &self,
        id: RecordId,
        from: &[JobStatus],
        to: JobStatus,
        error_detail: Option<&ErrorDetail>,
    ) -> Result<(), StoreError>;

    /// Unconditional status + error detail write, used only by the fallback path.
    fn write_raw(
        &self,
        id: RecordId,
        status: JobStatus,
        error_detail: &ErrorDetail,
    ) -> Result<(), StoreError>;

    /// Current accumulated duration in `field`, `None` if never written.
    fn duration(&self, id: RecordId, field: &str) -> Result<Option<f64>, StoreError>;

    /// Overwrite the duration in `field`.
    fn write_duration(&self, id: RecordId, field: &str, seconds: f64) -> Result<(), StoreError>;

    fn create_meter(&self, meter: &ProgressMeter) -> Result<(), StoreError>;

    /// The meter currently owned by `record_id`, if any.
    fn meter(&self, record_id: RecordId) -> Result<Option<ProgressMeter>, StoreError>;

    fn increment_meter(&self, meter_id: MeterId, units: u64) -> Result<(), StoreError>;

    fn delete_meter(&self, meter_id: MeterId) -> Result<(), StoreError>;

    /// Delete the record row (and any meter it still owns).
    fn delete(&self, id: RecordId) -> Result<(), StoreError>;

    /// Records of `kind` currently in `status`, oldest first.
    fn list_by_status(&self, kind: &str, status: JobStatus) -> Result<Vec<RecordId>, StoreError>;

    /// Every written duration of `field` across records of `kind`.
    fn durations(&self, kind: &str, field: &str) -> Result<Vec<f64>, StoreError>;
}
