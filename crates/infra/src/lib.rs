//! Storage, worker backends and the lifecycle orchestrator.

pub mod lifecycle;
pub mod store;
pub mod workers;

pub use lifecycle::{JobContext, Lifecycle, LifecycleConfig, LifecycleError, LifecycleSettings};
pub use store::{InMemoryRecordStore, RecordStore, StoreError};
pub use workers::{FailFastGateway, JobWorker, RetryingGateway, WorkerGateway};
