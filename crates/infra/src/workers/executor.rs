//! Job worker: claims deliveries from a backend and dispatches them by record kind.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::lifecycle::LifecycleError;

use super::{Delivery, DeliveryId, GatewayError, QueuedJob, WorkSource};

/// Delivery handler function type.
pub type DeliveryHandler = Box<dyn Fn(&QueuedJob) -> Result<(), LifecycleError> + Send + Sync>;

/// Job worker configuration.
#[derive(Debug, Clone)]
pub struct JobWorkerConfig {
    /// How often to poll for new deliveries when idle
    pub poll_interval: Duration,
    /// Name for logging and the worker thread
    pub name: String,
}

impl Default for JobWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "stint-worker".to_string(),
        }
    }
}

impl JobWorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct JobWorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl JobWorkerHandle {
    /// Request graceful shutdown and wait for the in-flight delivery to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current worker statistics.
    pub fn stats(&self) -> WorkerStats {
        self.stats
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct WorkerStats {
    pub deliveries_processed: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub uptime_secs: u64,
}

/// Result of handling one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Succeeded(DeliveryId),
    Failed { delivery: DeliveryId, error: String },
}

/// Totals from a [`JobWorker::work_off`] drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Background job worker.
///
/// Claims deliveries from the given queues, runs the handler registered for the
/// delivery's record kind, then acknowledges or rejects it. What a rejection
/// means (retry later, or record as failed) is up to the backend.
pub struct JobWorker<S: WorkSource> {
    source: S,
    queues: Vec<String>,
    handlers: HashMap<String, DeliveryHandler>,
}

impl<S: WorkSource + 'static> JobWorker<S> {
    /// Create a worker listening on `queues`, in priority order.
    pub fn new<I, Q>(source: S, queues: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        Self {
            source,
            queues: queues.into_iter().map(Into::into).collect(),
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a record kind.
    pub fn register_handler<F>(&mut self, kind: impl Into<String>, handler: F)
    where
        F: Fn(&QueuedJob) -> Result<(), LifecycleError> + Send + Sync + 'static,
    {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Claim and handle a single delivery, if one is ready.
    pub fn work_one(&self) -> Result<Option<WorkOutcome>, GatewayError> {
        let Some(delivery) = self.source.claim_next(&self.queues)? else {
            return Ok(None);
        };

        debug!(
            delivery = %delivery.job.id,
            record_id = %delivery.job.record_id,
            kind = %delivery.job.record_kind,
            attempt = delivery.attempt,
            "claimed delivery"
        );

        match self.dispatch(&delivery) {
            Ok(()) => {
                self.source.acknowledge(&delivery)?;
                Ok(Some(WorkOutcome::Succeeded(delivery.job.id)))
            }
            Err(error) => {
                self.source.reject(&delivery, &error)?;
                Ok(Some(WorkOutcome::Failed {
                    delivery: delivery.job.id,
                    error,
                }))
            }
        }
    }

    /// Handle deliveries until none is ready.
    pub fn work_off(&self) -> Result<WorkSummary, GatewayError> {
        let mut summary = WorkSummary::default();
        while let Some(outcome) = self.work_one()? {
            match outcome {
                WorkOutcome::Succeeded(_) => summary.succeeded += 1,
                WorkOutcome::Failed { .. } => summary.failed += 1,
            }
        }
        Ok(summary)
    }

    /// Spawn the worker in a background thread.
    pub fn spawn(self, config: JobWorkerConfig) -> std::io::Result<JobWorkerHandle>
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))?;

        Ok(JobWorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    fn dispatch(&self, delivery: &Delivery) -> Result<(), String> {
        let kind = &delivery.job.record_kind;
        let Some(handler) = self.handlers.get(kind) else {
            let error = format!("no handler for record kind: {kind}");
            warn!(delivery = %delivery.job.id, error = %error, "no handler for delivery");
            return Err(error);
        };
        handler(&delivery.job).map_err(|e| e.to_string())
    }
}

fn worker_loop<S: WorkSource + 'static>(
    worker: JobWorker<S>,
    config: JobWorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, queues = ?worker.queues, "job worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        let result = worker.work_one();

        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = start_time.elapsed().as_secs();
            if let Ok(Some(outcome)) = &result {
                s.deliveries_processed += 1;
                match outcome {
                    WorkOutcome::Succeeded(_) => s.deliveries_succeeded += 1,
                    WorkOutcome::Failed { .. } => s.deliveries_failed += 1,
                }
            }
        }

        match result {
            Ok(Some(WorkOutcome::Failed { delivery, error })) => {
                debug!(worker = %config.name, %delivery, error = %error, "delivery failed");
            }
            Ok(Some(WorkOutcome::Succeeded(_))) => {}
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(worker = %config.name, error = ?e, "failed to claim delivery");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "job worker stopped");
}
