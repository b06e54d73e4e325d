//! Handle passed to work methods during an execution.

use stint_core::{JobEvent, JobRecord, JobStatus, MeterId, RecordId};

use super::error::LifecycleError;
use super::orchestrator::Lifecycle;
use crate::store::StoreError;

/// What a running work method may ask of the engine.
///
/// Cancellation is cooperative: a work method that never polls
/// [`JobContext::cancel_requested`] runs to completion.
pub struct JobContext<'a, R> {
    lifecycle: &'a Lifecycle<R>,
    record_id: RecordId,
    meter: Option<MeterId>,
}

impl<'a, R: JobRecord> JobContext<'a, R> {
    pub(crate) fn new(lifecycle: &'a Lifecycle<R>, record_id: RecordId, meter: Option<MeterId>) -> Self {
        Self {
            lifecycle,
            record_id,
            meter,
        }
    }

    pub fn record_id(&self) -> RecordId {
        self.record_id
    }

    /// The live meter, `None` when progress tracking is off.
    pub fn meter_id(&self) -> Option<MeterId> {
        self.meter
    }

    pub fn increment_progress(&self) -> Result<(), StoreError> {
        self.increment_progress_by(1)
    }

    pub fn increment_progress_by(&self, units: u64) -> Result<(), StoreError> {
        match self.meter {
            Some(meter) => self.lifecycle.store().increment_meter(meter, units),
            None => Ok(()),
        }
    }

    /// Current reading of the live meter.
    pub fn progress(&self) -> Result<u8, StoreError> {
        Ok(self
            .lifecycle
            .store()
            .meter(self.record_id)?
            .map_or(0, |meter| meter.progress()))
    }

    /// Has someone asked for this execution to stop?
    pub fn cancel_requested(&self) -> Result<bool, StoreError> {
        Ok(self.lifecycle.store().status(self.record_id)? == JobStatus::CancelRequested)
    }

    /// Acknowledge a cancellation request; the execution then ends as `cancelled`.
    pub fn confirm_cancelled(&self, record: &mut R) -> Result<(), LifecycleError> {
        self.lifecycle.fire(record, JobEvent::ConfirmCancelled)?;
        Ok(())
    }

    /// Record the record's validation errors; the execution then ends as
    /// `validation_error`.
    pub fn store_validation_error(&self, record: &mut R) {
        self.lifecycle.store_validation_error(record);
    }
}
