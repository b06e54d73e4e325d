//! The lifecycle orchestrator: runs work methods against job-bearing records.
//!
//! One execution runs to completion on the calling thread, whether that is
//! the original caller or a worker that picked the record up from a queue:
//!
//! 1. exit early if cancellation was requested (confirming it) or confirmed
//! 2. `start` (compare-and-set `pending -> processing`; a failure propagates)
//! 3. create the progress meter, run the work method, `finish`
//! 4. on a fault, record it, notify, and re-raise unless a retrying backend
//!    is running this execution
//! 5. always: drop the meter, add elapsed time, log one line

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use stint_core::{
    ErrorDetail, Fault, JobEvent, JobRecord, JobState, JobStatus, MeterId, PerformMethod,
    ProgressMeter, RecordId,
};

use super::config::LifecycleConfig;
use super::context::JobContext;
use super::duration::{DurationAccumulator, DurationStats};
use super::error::LifecycleError;
use super::recorder::{fire_event, ErrorRecorder};
use crate::store::{RecordStore, StoreError, StoredRecord};
use crate::workers::{GatewayError, QueuedJob, WorkerGateway};

/// Lifecycle engine for one record type.
///
/// Cheap to clone; clones share configuration and store.
pub struct Lifecycle<R> {
    config: Arc<LifecycleConfig<R>>,
    store: Arc<dyn RecordStore>,
}

impl<R: JobRecord> Clone for Lifecycle<R> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: self.store.clone(),
        }
    }
}

impl<R: JobRecord> std::fmt::Debug for Lifecycle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("kind", &R::KIND)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<R: JobRecord> Lifecycle<R> {
    pub fn new(config: LifecycleConfig<R>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn config(&self) -> &LifecycleConfig<R> {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    // -- record persistence ---------------------------------------------------

    /// Persist a new record row with its current lifecycle fields.
    pub fn create(&self, record: &R) -> Result<(), StoreError> {
        let job = record.job();
        let mut durations = std::collections::HashMap::new();
        if let (Some(field), Some(total)) = (self.config.duration_field(), job.duration_total()) {
            durations.insert(field.to_string(), total);
        }
        self.store.insert(StoredRecord {
            id: record.id(),
            kind: R::KIND.to_string(),
            status: job.status(),
            error_detail: job.error_detail().clone(),
            durations,
        })
    }

    /// Replace the record's lifecycle fields with the persisted ones.
    pub fn reload(&self, record: &mut R) -> Result<(), StoreError> {
        let id = record.id();
        let stored = self.store.load(id)?;
        let duration = self
            .config
            .duration_field()
            .and_then(|field| stored.durations.get(field).copied());
        let meter = self.store.meter(id)?;
        *record.job_mut() = JobState::restore(stored.status, stored.error_detail, duration, meter);
        Ok(())
    }

    /// Delete a finished record. Returns `false`, with a `status` validation
    /// error on the record, while processing is not finished or cancelled.
    pub fn destroy(&self, record: &mut R) -> Result<bool, StoreError> {
        let status = self.refresh_status(record)?;
        if !status.is_terminal() {
            record.job_mut().errors_mut().add(
                "status",
                format!("Processing must be finished or cancelled, but status is '{status}'"),
            );
            return Ok(false);
        }
        self.store.delete(record.id())?;
        Ok(true)
    }

    // -- execution ------------------------------------------------------------

    /// Run the work method synchronously on the calling thread.
    ///
    /// `background` marks an execution started by a worker; only then may a
    /// retrying backend suppress the fault.
    pub fn process(&self, record: &mut R, background: bool) -> Result<(), LifecycleError> {
        self.execute(record, PerformMethod::Process, background)
    }

    /// Move a finished record back to `pending`, then run the reprocess method.
    pub fn reprocess(&self, record: &mut R, background: bool) -> Result<(), LifecycleError> {
        self.fire(record, JobEvent::Reprocess)?;
        self.execute(record, PerformMethod::Reprocess, background)
    }

    /// Hand the record to the worker gateway, or process it in place when
    /// background processing is off. `force` overrides the configured default.
    pub fn background_process(&self, record: &mut R, force: Option<bool>) -> Result<(), LifecycleError> {
        if self.background_for(force) {
            self.enqueue(record, PerformMethod::Process)
        } else {
            self.process(record, false)
        }
    }

    /// Like [`Lifecycle::background_process`] for reprocessing. The record is
    /// visibly `pending` before it is enqueued.
    pub fn background_reprocess(&self, record: &mut R, force: Option<bool>) -> Result<(), LifecycleError> {
        if !self.background_for(force) {
            return self.reprocess(record, false);
        }
        self.fire(record, JobEvent::Reprocess)?;
        self.enqueue(record, PerformMethod::Reprocess)
    }

    /// Entry point for workers running a queued delivery.
    pub fn perform(&self, record: &mut R, method: PerformMethod, background: bool) -> Result<(), LifecycleError> {
        self.execute(record, method, background)
    }

    /// Request cancellation.
    ///
    /// A `pending` record is dequeued and confirmed `cancelled` at once. A
    /// `processing` record only records the request; the running work method
    /// has to notice it.
    pub fn cancel_and_dequeue(&self, record: &mut R) -> Result<(), LifecycleError> {
        let was_pending = self.refresh_status(record)? == JobStatus::Pending;
        self.fire(record, JobEvent::RequestCancel)?;

        if was_pending {
            let queue = self.queue_for(record);
            if let Some(gateway) = self.config.gateway() {
                match gateway.dequeue(record.id(), &queue) {
                    Ok(()) => info!(record_id = %record.id(), kind = R::KIND, %queue, "removed from queue"),
                    Err(e) => warn!(record_id = %record.id(), kind = R::KIND, %queue, error = %e, "dequeue failed"),
                }
            }
            self.fire(record, JobEvent::ConfirmCancelled)?;
        }
        Ok(())
    }

    /// Record the record's validation errors and move it to
    /// `validation_error`. Never fails; a failed status write falls back to a
    /// raw write.
    pub fn store_validation_error(&self, record: &mut R) {
        self.recorder().record_validation(record);
    }

    /// Fire `confirm-cancelled` for a record whose work method stopped.
    pub fn confirm_cancelled(&self, record: &mut R) -> Result<(), LifecycleError> {
        self.fire(record, JobEvent::ConfirmCancelled)?;
        Ok(())
    }

    // -- queries --------------------------------------------------------------

    /// `100` once completed, otherwise the live meter's reading, otherwise `0`.
    pub fn progress(&self, record: &R) -> Result<u8, StoreError> {
        if record.job().status() == JobStatus::Completed {
            return Ok(100);
        }
        Ok(self
            .store
            .meter(record.id())?
            .map_or(0, |meter| meter.progress()))
    }

    pub fn queue_for(&self, record: &R) -> String {
        self.config.queue_for(record)
    }

    /// Is unclaimed work waiting for this record? Checks the record's own
    /// queue unless `queue` is given. Always `false` without a gateway.
    pub fn is_queued(&self, record: &R, queue: Option<&str>) -> Result<bool, GatewayError> {
        let Some(gateway) = self.config.gateway() else {
            return Ok(false);
        };
        let queue = queue.map_or_else(|| self.queue_for(record), str::to_string);
        gateway.is_queued(record.id(), &queue)
    }

    pub fn list_by_status(&self, status: JobStatus) -> Result<Vec<RecordId>, StoreError> {
        self.store.list_by_status(R::KIND, status)
    }

    /// Accumulated durations of every record of this type.
    pub fn durations(&self) -> Result<Vec<f64>, StoreError> {
        match self.config.duration_field() {
            Some(field) => self.store.durations(R::KIND, field),
            None => Ok(Vec::new()),
        }
    }

    pub fn duration_stats(&self) -> Result<Option<DurationStats>, StoreError> {
        Ok(DurationStats::from_samples(&self.durations()?))
    }

    /// A [`JobWorker`](crate::workers::JobWorker) handler for this record type.
    ///
    /// `loader` re-resolves the record from the delivery's id.
    pub fn worker_handler<L>(
        &self,
        loader: L,
    ) -> impl Fn(&QueuedJob) -> Result<(), LifecycleError> + Send + Sync + 'static + use<R, L>
    where
        L: Fn(RecordId) -> Result<R, LifecycleError> + Send + Sync + 'static,
    {
        let lifecycle = self.clone();
        move |job: &QueuedJob| {
            let mut record = loader(job.record_id)?;
            lifecycle.perform(&mut record, job.perform, true)
        }
    }

    // -- internals ------------------------------------------------------------

    pub(crate) fn fire(&self, record: &mut R, event: JobEvent) -> Result<JobStatus, LifecycleError> {
        fire_event(self.store.as_ref(), record, event, None)
    }

    fn execute(&self, record: &mut R, method: PerformMethod, background: bool) -> Result<(), LifecycleError> {
        match self.refresh_status(record)? {
            JobStatus::CancelRequested => {
                self.fire(record, JobEvent::ConfirmCancelled)?;
                return Ok(());
            }
            JobStatus::Cancelled => return Ok(()),
            _ => {}
        }

        let started = Instant::now();
        fire_event(self.store.as_ref(), record, JobEvent::Start, Some(ErrorDetail::new()))?;

        let result = match self.run_attempt(record, method) {
            Ok(()) => Ok(()),
            Err(fault) => {
                self.recorder().record_fault(record, &fault);
                if background && self.rescues_errors() {
                    debug!(record_id = %record.id(), kind = R::KIND, fault = %fault, "fault rescued for retrying backend");
                    Ok(())
                } else {
                    Err(LifecycleError::Fault(fault))
                }
            }
        };

        self.cleanup(record, started.elapsed());
        result
    }

    fn run_attempt(&self, record: &mut R, method: PerformMethod) -> Result<(), Fault> {
        let meter = if self.config.progress_meter() {
            Some(self.create_meter(record)?)
        } else {
            None
        };

        let work = match method {
            PerformMethod::Process => &self.config.work,
            PerformMethod::Reprocess => &self.config.reprocess,
        };
        let ctx = JobContext::new(self, record.id(), meter);
        match panic::catch_unwind(AssertUnwindSafe(|| work(record, &ctx))) {
            Ok(outcome) => outcome?,
            Err(payload) => return Err(Fault::from_panic(payload)),
        }

        match record.job().status() {
            JobStatus::ValidationError | JobStatus::Cancelled => Ok(()),
            _ => self
                .fire(record, JobEvent::Finish)
                .map(|_| ())
                .map_err(LifecycleError::into_fault),
        }
    }

    fn create_meter(&self, record: &mut R) -> Result<MeterId, Fault> {
        let meter = ProgressMeter::new(record.id(), self.total_count(record));
        self.store.create_meter(&meter)?;
        let id = meter.id;
        record.job_mut().set_progress_meter(Some(meter));
        Ok(id)
    }

    /// Missing provider, fault, or panic all count as `1`.
    fn total_count(&self, record: &R) -> i64 {
        let Some(provider) = &self.config.total_count else {
            return 1;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| provider(record))) {
            Ok(Ok(total)) => total,
            Ok(Err(fault)) => {
                debug!(record_id = %record.id(), kind = R::KIND, fault = %fault, "total count failed, using 1");
                1
            }
            Err(_) => {
                debug!(record_id = %record.id(), kind = R::KIND, "total count panicked, using 1");
                1
            }
        }
    }

    fn cleanup(&self, record: &mut R, elapsed: Duration) {
        let id = record.id();
        if let Some(meter_id) = record.job().progress_meter().map(|m| m.id) {
            if let Err(e) = self.store.delete_meter(meter_id) {
                warn!(record_id = %id, meter_id = %meter_id, error = %e, "failed to delete progress meter");
            }
            record.job_mut().set_progress_meter(None);
        }

        if let Some(field) = self.config.duration_field() {
            if let Err(e) = DurationAccumulator::new(self.store.as_ref(), field).add(record, elapsed) {
                warn!(record_id = %id, field, error = %e, "failed to record duration");
            }
        }

        self.config.logger().log(&format!(
            "[stint] {}({}) - {} {}",
            R::KIND,
            id,
            record.job().status(),
            elapsed.as_secs()
        ));
    }

    fn refresh_status(&self, record: &mut R) -> Result<JobStatus, StoreError> {
        let status = self.store.status(record.id())?;
        record.job_mut().overwrite_status(status);
        Ok(status)
    }

    fn enqueue(&self, record: &R, method: PerformMethod) -> Result<(), LifecycleError> {
        let gateway = self.config.gateway().ok_or(GatewayError::NotConfigured)?;
        let queue = self.queue_for(record);
        gateway.enqueue(QueuedJob::new(record.id(), R::KIND, queue.clone(), method))?;
        info!(record_id = %record.id(), kind = R::KIND, %queue, perform = %method, gateway = gateway.name(), "enqueued");
        Ok(())
    }

    fn background_for(&self, force: Option<bool>) -> bool {
        force.unwrap_or(self.config.background())
    }

    fn rescues_errors(&self) -> bool {
        self.config
            .gateway()
            .is_some_and(|gateway| gateway.should_rescue_errors())
    }

    fn recorder(&self) -> ErrorRecorder<'_> {
        ErrorRecorder::new(self.store.as_ref(), self.config.notifier.as_ref())
    }
}
