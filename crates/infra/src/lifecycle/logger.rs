//! Per-execution log line sink.

use std::sync::Arc;

/// Where the one-line execution summary goes.
#[derive(Clone, Default)]
pub enum ExecutionLogger {
    /// Emit through `tracing` at `info`.
    #[default]
    Tracing,
    /// Drop the line.
    Silent,
    Custom(Arc<dyn Fn(&str) + Send + Sync>),
}

impl ExecutionLogger {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn log(&self, line: &str) {
        match self {
            ExecutionLogger::Tracing => tracing::info!(target: "stint", "{line}"),
            ExecutionLogger::Silent => {}
            ExecutionLogger::Custom(f) => f(line),
        }
    }
}

impl std::fmt::Debug for ExecutionLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionLogger::Tracing => f.write_str("Tracing"),
            ExecutionLogger::Silent => f.write_str("Silent"),
            ExecutionLogger::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
