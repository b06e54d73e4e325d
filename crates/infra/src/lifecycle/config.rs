//! Per-record-type lifecycle configuration.

use std::sync::Arc;

use stint_core::{Fault, JobRecord};

use super::context::JobContext;
use super::logger::ExecutionLogger;
use super::settings::{LifecycleSettings, DEFAULT_DURATION_FIELD, DEFAULT_QUEUE};
use crate::workers::WorkerGateway;

/// A work method: arbitrary application code run against one record.
pub type WorkFn<R> = Arc<dyn Fn(&mut R, &JobContext<'_, R>) -> Result<(), Fault> + Send + Sync>;

/// Computes the progress meter total for a record.
pub type TotalCountFn<R> = Arc<dyn Fn(&R) -> Result<i64, Fault> + Send + Sync>;

/// Receives every captured application fault.
pub type ErrorNotifier = Arc<dyn Fn(&Fault) + Send + Sync>;

/// Queue a record's background work is routed to.
pub enum QueueName<R> {
    Fixed(String),
    /// Chosen per record (priority, tenant, ...).
    Select(Arc<dyn Fn(&R) -> String + Send + Sync>),
}

impl<R> QueueName<R> {
    pub fn resolve(&self, record: &R) -> String {
        match self {
            QueueName::Fixed(name) => name.clone(),
            QueueName::Select(select) => select(record),
        }
    }
}

impl<R> Clone for QueueName<R> {
    fn clone(&self) -> Self {
        match self {
            QueueName::Fixed(name) => QueueName::Fixed(name.clone()),
            QueueName::Select(select) => QueueName::Select(select.clone()),
        }
    }
}

impl<R> std::fmt::Debug for QueueName<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueName::Fixed(name) => f.debug_tuple("Fixed").field(name).finish(),
            QueueName::Select(_) => f.write_str("Select(..)"),
        }
    }
}

/// Immutable lifecycle configuration for one record type.
pub struct LifecycleConfig<R> {
    pub(crate) work: WorkFn<R>,
    pub(crate) reprocess: WorkFn<R>,
    pub(crate) background: bool,
    pub(crate) queue: QueueName<R>,
    pub(crate) gateway: Option<Arc<dyn WorkerGateway>>,
    pub(crate) progress_meter: bool,
    pub(crate) total_count: Option<TotalCountFn<R>>,
    pub(crate) duration_field: Option<String>,
    pub(crate) notifier: Option<ErrorNotifier>,
    pub(crate) logger: ExecutionLogger,
}

impl<R: JobRecord> LifecycleConfig<R> {
    /// Start a configuration around the record type's work method.
    pub fn builder<F>(work: F) -> LifecycleConfigBuilder<R>
    where
        F: Fn(&mut R, &JobContext<'_, R>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        LifecycleConfigBuilder::new(Arc::new(work))
    }

    pub fn background(&self) -> bool {
        self.background
    }

    pub fn queue_for(&self, record: &R) -> String {
        self.queue.resolve(record)
    }

    pub fn gateway(&self) -> Option<&Arc<dyn WorkerGateway>> {
        self.gateway.as_ref()
    }

    pub fn progress_meter(&self) -> bool {
        self.progress_meter
    }

    pub fn duration_field(&self) -> Option<&str> {
        self.duration_field.as_deref()
    }

    pub fn logger(&self) -> &ExecutionLogger {
        &self.logger
    }
}

impl<R> std::fmt::Debug for LifecycleConfig<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleConfig")
            .field("background", &self.background)
            .field("queue", &self.queue)
            .field("gateway", &self.gateway.as_ref().map(|g| g.name()))
            .field("progress_meter", &self.progress_meter)
            .field("total_count", &self.total_count.is_some())
            .field("duration_field", &self.duration_field)
            .field("notifier", &self.notifier.is_some())
            .field("logger", &self.logger)
            .finish_non_exhaustive()
    }
}

/// Builder for [`LifecycleConfig`].
pub struct LifecycleConfigBuilder<R> {
    work: WorkFn<R>,
    reprocess: Option<WorkFn<R>>,
    background: bool,
    queue: QueueName<R>,
    gateway: Option<Arc<dyn WorkerGateway>>,
    progress_meter: bool,
    total_count: Option<TotalCountFn<R>>,
    duration_field: Option<String>,
    notifier: Option<ErrorNotifier>,
    logger: ExecutionLogger,
}

impl<R: JobRecord> LifecycleConfigBuilder<R> {
    fn new(work: WorkFn<R>) -> Self {
        Self {
            work,
            reprocess: None,
            background: false,
            queue: QueueName::Fixed(DEFAULT_QUEUE.to_string()),
            gateway: None,
            progress_meter: true,
            total_count: None,
            duration_field: Some(DEFAULT_DURATION_FIELD.to_string()),
            notifier: None,
            logger: ExecutionLogger::default(),
        }
    }

    /// Work method for reprocessing; defaults to the work method.
    pub fn reprocess_with<F>(mut self, reprocess: F) -> Self
    where
        F: Fn(&mut R, &JobContext<'_, R>) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.reprocess = Some(Arc::new(reprocess));
        self
    }

    pub fn background(mut self, background: bool) -> Self {
        self.background = background;
        self
    }

    pub fn queue(mut self, name: impl Into<String>) -> Self {
        self.queue = QueueName::Fixed(name.into());
        self
    }

    pub fn queue_selector<F>(mut self, select: F) -> Self
    where
        F: Fn(&R) -> String + Send + Sync + 'static,
    {
        self.queue = QueueName::Select(Arc::new(select));
        self
    }

    pub fn gateway(mut self, gateway: Arc<dyn WorkerGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn progress_meter(mut self, enabled: bool) -> Self {
        self.progress_meter = enabled;
        self
    }

    pub fn total_count<F>(mut self, total: F) -> Self
    where
        F: Fn(&R) -> Result<i64, Fault> + Send + Sync + 'static,
    {
        self.total_count = Some(Arc::new(total));
        self
    }

    pub fn duration_field(mut self, field: impl Into<String>) -> Self {
        self.duration_field = Some(field.into());
        self
    }

    /// Turn off duration accounting.
    pub fn without_duration(mut self) -> Self {
        self.duration_field = None;
        self
    }

    pub fn notifier<F>(mut self, notify: F) -> Self
    where
        F: Fn(&Fault) + Send + Sync + 'static,
    {
        self.notifier = Some(Arc::new(notify));
        self
    }

    pub fn logger(mut self, logger: ExecutionLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Apply data-only settings. A queue selector set earlier is replaced by
    /// the settings' fixed queue.
    pub fn settings(mut self, settings: &LifecycleSettings) -> Self {
        self.background = settings.background_processing;
        self.progress_meter = settings.progress_meter;
        self.queue = QueueName::Fixed(settings.queue.clone());
        self.duration_field = settings.duration_field.clone();
        self
    }

    pub fn build(self) -> LifecycleConfig<R> {
        LifecycleConfig {
            reprocess: self.reprocess.unwrap_or_else(|| self.work.clone()),
            work: self.work,
            background: self.background,
            queue: self.queue,
            gateway: self.gateway,
            progress_meter: self.progress_meter,
            total_count: self.total_count,
            duration_field: self.duration_field,
            notifier: self.notifier,
            logger: self.logger,
        }
    }
}
