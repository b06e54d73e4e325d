//! Shared fixtures for the scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use stint_core::{JobRecord, JobState, RecordId};
use stint_infra::lifecycle::{Lifecycle, LifecycleConfig, LifecycleError};
use stint_infra::workers::{FailFastGateway, GatewayError, QueuedJob, WorkerGateway};
use stint_infra::{InMemoryRecordStore, RecordStore};

/// A bulk import: the job-bearing record used across scenarios.
#[derive(Debug, Clone)]
pub struct Import {
    pub id: RecordId,
    pub rows: i64,
    pub priority: bool,
    pub job: JobState,
}

impl Import {
    pub fn new(rows: i64) -> Self {
        Self {
            id: RecordId::new(),
            rows,
            priority: false,
            job: JobState::new(),
        }
    }

    pub fn with_id(id: RecordId) -> Self {
        Self {
            id,
            rows: 0,
            priority: false,
            job: JobState::new(),
        }
    }
}

impl JobRecord for Import {
    const KIND: &'static str = "Import";

    fn id(&self) -> RecordId {
        self.id
    }

    fn job(&self) -> &JobState {
        &self.job
    }

    fn job_mut(&mut self) -> &mut JobState {
        &mut self.job
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RuntimeError(pub String);

pub fn boom() -> RuntimeError {
    RuntimeError("boom".to_string())
}

pub fn setup(config: LifecycleConfig<Import>) -> (Lifecycle<Import>, Arc<InMemoryRecordStore>) {
    stint_observability::init_for_tests();
    let store = InMemoryRecordStore::arc();
    (Lifecycle::new(config, store.clone()), store)
}

pub fn created(lifecycle: &Lifecycle<Import>, rows: i64) -> Import {
    let import = Import::new(rows);
    lifecycle.create(&import).expect("insert import");
    import
}

/// Re-resolves imports for workers from the persisted lifecycle fields.
pub fn loader(
    lifecycle: &Lifecycle<Import>,
) -> impl Fn(RecordId) -> Result<Import, LifecycleError> + Send + Sync + 'static + use<> {
    let lifecycle = lifecycle.clone();
    move |id| {
        let mut import = Import::with_id(id);
        lifecycle.reload(&mut import)?;
        Ok(import)
    }
}

pub fn stored_status(store: &InMemoryRecordStore, id: RecordId) -> stint_core::JobStatus {
    store.status(id).expect("stored status")
}

/// Fail-fast gateway that counts dequeue calls.
#[derive(Debug, Default)]
pub struct CountingGateway {
    pub inner: FailFastGateway,
    pub dequeues: AtomicUsize,
}

impl CountingGateway {
    pub fn dequeue_calls(&self) -> usize {
        self.dequeues.load(Ordering::SeqCst)
    }
}

impl WorkerGateway for CountingGateway {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn enqueue(&self, job: QueuedJob) -> Result<(), GatewayError> {
        self.inner.enqueue(job)
    }

    fn dequeue(&self, record_id: RecordId, queue: &str) -> Result<(), GatewayError> {
        self.dequeues.fetch_add(1, Ordering::SeqCst);
        self.inner.dequeue(record_id, queue)
    }

    fn is_queued(&self, record_id: RecordId, queue: &str) -> Result<bool, GatewayError> {
        self.inner.is_queued(record_id, queue)
    }

    fn should_rescue_errors(&self) -> bool {
        self.inner.should_rescue_errors()
    }
}
