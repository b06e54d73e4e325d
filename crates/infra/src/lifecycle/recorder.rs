//! Error capture: faults and validation failures into status + error detail,
//! with the raw-write fallback when the status write itself fails.

use std::panic::{self, AssertUnwindSafe};

use tracing::{error, warn};

use stint_core::{
    ErrorDetail, Fault, JobEvent, JobRecord, JobStatus, StateTransitionError, StatusMachine,
};

use super::config::ErrorNotifier;
use super::error::LifecycleError;
use crate::store::{RecordStore, StoreError};

/// Guarded status write: a compare-and-set against the persisted status.
///
/// Only `start` and the error paths pass a `detail`; every other event keeps
/// the persisted error detail. On success the record's status, and the detail
/// if one was written, follow the store. On a conflict the record is resynced
/// to the persisted status and a transition error naming that status is
/// returned; nothing is written.
pub(crate) fn fire_event<R: JobRecord>(
    store: &dyn RecordStore,
    record: &mut R,
    event: JobEvent,
    detail: Option<ErrorDetail>,
) -> Result<JobStatus, LifecycleError> {
    let id = record.id();
    let target = StatusMachine::target(event);
    match store.transition(id, StatusMachine::sources(event), target, detail.as_ref()) {
        Ok(()) => {
            let job = record.job_mut();
            job.overwrite_status(target);
            if let Some(detail) = detail {
                job.set_error_detail(detail);
            }
            Ok(target)
        }
        Err(StoreError::StatusConflict { actual, .. }) => {
            record.job_mut().overwrite_status(actual);
            Err(StateTransitionError { event, from: actual }.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) struct ErrorRecorder<'a> {
    store: &'a dyn RecordStore,
    notifier: Option<&'a ErrorNotifier>,
}

impl<'a> ErrorRecorder<'a> {
    pub(crate) fn new(store: &'a dyn RecordStore, notifier: Option<&'a ErrorNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Move the record to `processing_error` with the fault's detail, then
    /// notify. Never fails.
    pub(crate) fn record_fault<R: JobRecord>(&self, record: &mut R, fault: &Fault) {
        let detail = ErrorDetail::from_fault(fault);
        record.job_mut().set_error_detail(detail.clone());
        if let Err(cause) = fire_event(self.store, record, JobEvent::MarkProcessingError, Some(detail)) {
            self.fallback(record, JobStatus::ProcessingError, &cause);
        }
        self.notify(fault);
    }

    /// Move the record to `validation_error` with its field errors. Never fails.
    pub(crate) fn record_validation<R: JobRecord>(&self, record: &mut R) {
        let detail = ErrorDetail::from_validation(record.job().errors());
        record.job_mut().set_error_detail(detail.clone());
        if let Err(cause) = fire_event(self.store, record, JobEvent::MarkValidationError, Some(detail)) {
            self.fallback(record, JobStatus::ValidationError, &cause);
        }
    }

    fn fallback<R: JobRecord>(&self, record: &mut R, status: JobStatus, cause: &LifecycleError) {
        let id = record.id();
        warn!(
            record_id = %id,
            kind = R::KIND,
            %status,
            error = %cause,
            error_detail = %record.job().error_detail(),
            "status write failed, falling back to raw write"
        );

        let placeholder = ErrorDetail::persistence_failure();
        let job = record.job_mut();
        job.overwrite_status(status);
        job.set_error_detail(placeholder.clone());

        if let Err(e) = self.store.write_raw(id, status, &placeholder) {
            error!(record_id = %id, kind = R::KIND, %status, error = %e, "fallback write failed");
        }
    }

    fn notify(&self, fault: &Fault) {
        let Some(notifier) = self.notifier else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| notifier(fault))).is_err() {
            error!(fault = %fault, "error notifier panicked");
        }
    }
}
