//! `stint-core` — lifecycle engine building blocks.
//!
//! This crate contains **pure domain** primitives (no storage or queue concerns):
//! the status state machine, progress meters, failure records and the
//! [`JobRecord`] capability trait that application records implement.

pub mod error;
pub mod fault;
pub mod id;
pub mod progress;
pub mod record;
pub mod status;

pub use error::{DomainError, DomainResult, StateTransitionError};
pub use fault::{ErrorDetail, Fault, ValidationErrors, PANIC_KIND, PERSISTENCE_FAILURE};
pub use id::{MeterId, RecordId};
pub use progress::ProgressMeter;
pub use record::{JobRecord, JobState, PerformMethod};
pub use status::{JobEvent, JobStatus, StatusMachine};
