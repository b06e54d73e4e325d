//! Job lifecycle orchestration.
//!
//! ## Components
//!
//! - `Lifecycle`: process / reprocess / background / cancel operations over
//!   one record type
//! - `LifecycleConfig`: immutable per-type configuration (work methods, queue,
//!   gateway, progress, durations, notifier, logger)
//! - `LifecycleSettings`: the data-only part of the configuration, from JSON
//!   or `STINT_*` environment variables
//! - `JobContext`: what a running work method can reach (progress,
//!   cancellation, validation errors)

mod config;
mod context;
mod duration;
mod error;
mod logger;
mod orchestrator;
mod recorder;
mod settings;

pub use config::{ErrorNotifier, LifecycleConfig, LifecycleConfigBuilder, QueueName, TotalCountFn, WorkFn};
pub use context::JobContext;
pub use duration::DurationStats;
pub use error::LifecycleError;
pub use logger::ExecutionLogger;
pub use orchestrator::Lifecycle;
pub use settings::{LifecycleSettings, SettingsError, DEFAULT_DURATION_FIELD, DEFAULT_QUEUE};
