//! Asynchronous execution backends.
//!
//! ## Design
//!
//! - The orchestrator only sees [`WorkerGateway`]: enqueue, dequeue, queued?,
//!   and whether the backend retries failures itself
//! - Workers see [`WorkSource`]: claim the next delivery, then acknowledge or reject it
//! - Deliveries carry record identity, kind, queue and perform method only, so
//!   a separate worker re-resolves the record before running it
//!
//! ## Components
//!
//! - `RetryingGateway`: retries rejected deliveries with backoff, dead-letters
//!   after the attempt limit; rescues application errors
//! - `FailFastGateway`: named FIFO queues, rejected deliveries land in a failed
//!   list and are never retried; application errors must surface
//! - `JobWorker`: drains a gateway, dispatching deliveries to handlers by record kind

pub mod executor;
pub mod fail_fast;
pub mod retry;
pub mod retrying;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use stint_core::{PerformMethod, RecordId};

pub use executor::{JobWorker, JobWorkerConfig, JobWorkerHandle, WorkOutcome, WorkSummary, WorkerStats};
pub use fail_fast::{FailFastGateway, FailedDelivery, QueueStats};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use retrying::{DeadLetterEntry, RetryingGateway};

/// Unique delivery identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(pub Uuid);

impl DeliveryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for DeliveryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of queued work: enough to re-resolve and run one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: DeliveryId,
    pub record_id: RecordId,
    pub record_kind: String,
    pub queue: String,
    pub perform: PerformMethod,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(
        record_id: RecordId,
        record_kind: impl Into<String>,
        queue: impl Into<String>,
        perform: PerformMethod,
    ) -> Self {
        Self {
            id: DeliveryId::new(),
            record_id,
            record_kind: record_kind.into(),
            queue: queue.into(),
            perform,
            enqueued_at: Utc::now(),
        }
    }
}

/// A claimed job, owned by one worker until acknowledged or rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub job: QueuedJob,
    /// 1-based attempt number of this claim.
    pub attempt: u32,
}

/// Gateway error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Background execution was requested but no gateway is configured.
    #[error("no worker gateway configured")]
    NotConfigured,
    #[error("delivery not found: {0}")]
    UnknownDelivery(DeliveryId),
    #[error("worker backend error: {0}")]
    Backend(String),
}

/// Orchestrator-facing capabilities of an execution backend.
pub trait WorkerGateway: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Schedule asynchronous execution. Must not block on completion.
    fn enqueue(&self, job: QueuedJob) -> Result<(), GatewayError>;

    /// Best-effort removal of not-yet-claimed work for `record_id`.
    fn dequeue(&self, record_id: RecordId, queue: &str) -> Result<(), GatewayError>;

    /// Is unclaimed work pending for `record_id` in `queue`?
    fn is_queued(&self, record_id: RecordId, queue: &str) -> Result<bool, GatewayError>;

    /// True when the backend already retries failed executions, in which case
    /// background executions must not re-raise application faults.
    fn should_rescue_errors(&self) -> bool;
}

/// Worker-facing side of an execution backend.
pub trait WorkSource: Send + Sync {
    /// Claim the oldest ready delivery in any of `queues`.
    fn claim_next(&self, queues: &[String]) -> Result<Option<Delivery>, GatewayError>;

    /// The delivery ran to completion.
    fn acknowledge(&self, delivery: &Delivery) -> Result<(), GatewayError>;

    /// The delivery failed; the backend decides whether it is retried.
    fn reject(&self, delivery: &Delivery, error: &str) -> Result<(), GatewayError>;
}

impl<T: WorkSource + ?Sized> WorkSource for Arc<T> {
    fn claim_next(&self, queues: &[String]) -> Result<Option<Delivery>, GatewayError> {
        (**self).claim_next(queues)
    }

    fn acknowledge(&self, delivery: &Delivery) -> Result<(), GatewayError> {
        (**self).acknowledge(delivery)
    }

    fn reject(&self, delivery: &Delivery, error: &str) -> Result<(), GatewayError> {
        (**self).reject(delivery, error)
    }
}

pub(crate) fn poisoned() -> GatewayError {
    GatewayError::Backend("worker queue lock poisoned".to_string())
}
