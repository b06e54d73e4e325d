//! Orchestrator error taxonomy.

use thiserror::Error;

use stint_core::{Fault, RecordId, StateTransitionError};

use crate::store::StoreError;
use crate::workers::GatewayError;

/// Error returned by lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Precondition violation: the persisted status does not allow the event.
    #[error(transparent)]
    Transition(#[from] StateTransitionError),

    /// Application fault raised by a work method, already recorded on the record.
    #[error("job fault: {0}")]
    Fault(Fault),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A worker could not re-resolve a queued record.
    #[error("record {id} could not be loaded: {reason}")]
    Load { id: RecordId, reason: String },
}

impl LifecycleError {
    /// The application fault, if this error carries one.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            LifecycleError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    pub fn is_precondition(&self) -> bool {
        matches!(self, LifecycleError::Transition(_))
    }

    pub(crate) fn into_fault(self) -> Fault {
        match self {
            LifecycleError::Fault(fault) => fault,
            LifecycleError::Transition(e) => e.into(),
            LifecycleError::Store(e) => e.into(),
            LifecycleError::Gateway(e) => e.into(),
            other => Fault::new("LifecycleError", other.to_string()),
        }
    }
}
