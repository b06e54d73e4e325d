//! Fail-fast backend: named FIFO queues with no automatic retry.
//!
//! A rejected delivery is recorded in the failed list and counted; nothing is
//! rescheduled. Because of that, application faults must reach the worker
//! (`should_rescue_errors() == false`) or they would never be seen.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use stint_core::RecordId;

use super::{poisoned, Delivery, GatewayError, QueuedJob, WorkSource, WorkerGateway};

/// A delivery that failed.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDelivery {
    pub job: QueuedJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Processed/failed counters, as reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub processed: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, VecDeque<QueuedJob>>,
    failed: Vec<FailedDelivery>,
    stats: QueueStats,
}

/// In-process fail-fast backend.
#[derive(Debug, Default)]
pub struct FailFastGateway {
    state: Mutex<State>,
}

impl FailFastGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unclaimed deliveries in `queue`.
    pub fn queue_size(&self, queue: &str) -> Result<usize, GatewayError> {
        Ok(self.state()?.queues.get(queue).map_or(0, VecDeque::len))
    }

    pub fn failed(&self) -> Result<Vec<FailedDelivery>, GatewayError> {
        Ok(self.state()?.failed.clone())
    }

    pub fn stats(&self) -> Result<QueueStats, GatewayError> {
        Ok(self.state()?.stats)
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, GatewayError> {
        self.state.lock().map_err(|_| poisoned())
    }
}

impl WorkerGateway for FailFastGateway {
    fn name(&self) -> &'static str {
        "fail_fast"
    }

    fn enqueue(&self, job: QueuedJob) -> Result<(), GatewayError> {
        debug!(record_id = %job.record_id, queue = %job.queue, perform = %job.perform, "enqueued");
        self.state()?
            .queues
            .entry(job.queue.clone())
            .or_default()
            .push_back(job);
        Ok(())
    }

    fn dequeue(&self, record_id: RecordId, queue: &str) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        if let Some(pending) = state.queues.get_mut(queue) {
            let before = pending.len();
            pending.retain(|job| job.record_id != record_id);
            debug!(%record_id, queue, removed = before - pending.len(), "dequeued");
        }
        Ok(())
    }

    fn is_queued(&self, record_id: RecordId, queue: &str) -> Result<bool, GatewayError> {
        Ok(self
            .state()?
            .queues
            .get(queue)
            .is_some_and(|pending| pending.iter().any(|job| job.record_id == record_id)))
    }

    fn should_rescue_errors(&self) -> bool {
        false
    }
}

impl WorkSource for FailFastGateway {
    fn claim_next(&self, queues: &[String]) -> Result<Option<Delivery>, GatewayError> {
        let mut state = self.state()?;
        for name in queues {
            if let Some(job) = state.queues.get_mut(name).and_then(VecDeque::pop_front) {
                return Ok(Some(Delivery { job, attempt: 1 }));
            }
        }
        Ok(None)
    }

    fn acknowledge(&self, _delivery: &Delivery) -> Result<(), GatewayError> {
        self.state()?.stats.processed += 1;
        Ok(())
    }

    fn reject(&self, delivery: &Delivery, error: &str) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        state.stats.processed += 1;
        state.stats.failed += 1;
        warn!(delivery = %delivery.job.id, record_id = %delivery.job.record_id, error, "delivery failed");
        state.failed.push(FailedDelivery {
            job: delivery.job.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        Ok(())
    }
}
