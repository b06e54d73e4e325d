//! Retrying backend: failed deliveries are rescheduled with backoff and
//! dead-lettered once the attempt limit is reached.
//!
//! Claimed work cannot be recalled, and neither can queued work: `dequeue` is
//! a no-op. A cancelled record whose delivery is still queued exits as soon
//! as a worker picks it up.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use stint_core::RecordId;

use super::retry::RetryPolicy;
use super::{poisoned, Delivery, DeliveryId, GatewayError, QueuedJob, WorkSource, WorkerGateway};

#[derive(Debug, Clone)]
struct Entry {
    job: QueuedJob,
    attempts: u32,
    run_at: Option<DateTime<Utc>>,
    locked: bool,
    last_error: Option<String>,
}

impl Entry {
    fn is_ready(&self, now: DateTime<Utc>) -> bool {
        !self.locked && self.run_at.map_or(true, |at| now >= at)
    }
}

/// A delivery that exhausted its retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: QueuedJob,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<DeliveryId, Entry>,
    dead_letters: Vec<DeadLetterEntry>,
}

/// In-process retrying backend.
#[derive(Debug, Default)]
pub struct RetryingGateway {
    policy: RetryPolicy,
    state: Mutex<State>,
}

impl RetryingGateway {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliveries in `queue`, claimed or not.
    pub fn queue_size(&self, queue: &str) -> Result<usize, GatewayError> {
        Ok(self
            .state()?
            .entries
            .values()
            .filter(|e| e.job.queue == queue)
            .count())
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, GatewayError> {
        Ok(self.state()?.dead_letters.clone())
    }

    /// Last failure recorded for a still-queued delivery.
    pub fn last_error(&self, id: DeliveryId) -> Result<Option<String>, GatewayError> {
        Ok(self
            .state()?
            .entries
            .get(&id)
            .and_then(|e| e.last_error.clone()))
    }

    /// Make every scheduled retry immediately ready.
    pub fn release_scheduled(&self) -> Result<(), GatewayError> {
        for entry in self.state()?.entries.values_mut() {
            entry.run_at = None;
        }
        Ok(())
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, GatewayError> {
        self.state.lock().map_err(|_| poisoned())
    }
}

impl WorkerGateway for RetryingGateway {
    fn name(&self) -> &'static str {
        "retrying"
    }

    fn enqueue(&self, job: QueuedJob) -> Result<(), GatewayError> {
        debug!(record_id = %job.record_id, queue = %job.queue, perform = %job.perform, "enqueued");
        self.state()?.entries.insert(
            job.id,
            Entry {
                job,
                attempts: 0,
                run_at: None,
                locked: false,
                last_error: None,
            },
        );
        Ok(())
    }

    fn dequeue(&self, record_id: RecordId, queue: &str) -> Result<(), GatewayError> {
        debug!(%record_id, queue, "retrying backend cannot dequeue; job will exit on pickup");
        Ok(())
    }

    fn is_queued(&self, record_id: RecordId, queue: &str) -> Result<bool, GatewayError> {
        Ok(self
            .state()?
            .entries
            .values()
            .any(|e| !e.locked && e.job.record_id == record_id && e.job.queue == queue))
    }

    fn should_rescue_errors(&self) -> bool {
        true
    }
}

impl WorkSource for RetryingGateway {
    fn claim_next(&self, queues: &[String]) -> Result<Option<Delivery>, GatewayError> {
        let mut state = self.state()?;
        let now = Utc::now();

        let next = state
            .entries
            .values()
            .filter(|e| e.is_ready(now) && queues.contains(&e.job.queue))
            .min_by_key(|e| (e.job.enqueued_at, e.job.id.0))
            .map(|e| e.job.id);

        let Some(id) = next else {
            return Ok(None);
        };
        let Some(entry) = state.entries.get_mut(&id) else {
            return Ok(None);
        };
        entry.locked = true;
        entry.attempts += 1;
        Ok(Some(Delivery {
            job: entry.job.clone(),
            attempt: entry.attempts,
        }))
    }

    fn acknowledge(&self, delivery: &Delivery) -> Result<(), GatewayError> {
        self.state()?
            .entries
            .remove(&delivery.job.id)
            .map(|_| ())
            .ok_or(GatewayError::UnknownDelivery(delivery.job.id))
    }

    fn reject(&self, delivery: &Delivery, error: &str) -> Result<(), GatewayError> {
        let mut state = self.state()?;
        let id = delivery.job.id;
        let entry = state
            .entries
            .get_mut(&id)
            .ok_or(GatewayError::UnknownDelivery(id))?;

        if self.policy.should_retry(entry.attempts) {
            let delay = self.policy.delay_for_attempt(entry.attempts);
            entry.run_at = Some(retry_at(Utc::now(), delay));
            entry.locked = false;
            entry.last_error = Some(error.to_string());
            debug!(delivery = %id, attempt = entry.attempts, ?delay, "delivery rescheduled");
            return Ok(());
        }

        let attempts = entry.attempts;
        state.entries.remove(&id);
        warn!(delivery = %id, attempts, error, "delivery dead-lettered");
        state.dead_letters.push(DeadLetterEntry {
            job: delivery.job.clone(),
            attempts,
            reason: error.to_string(),
            dead_lettered_at: Utc::now(),
        });
        Ok(())
    }
}

/// `now + delay`, capped at the latest representable instant.
fn retry_at(now: DateTime<Utc>, delay: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
