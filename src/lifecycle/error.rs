use thiserror::Error;

use super::Phase;
use crate::error::{BoxError, MultiError};

/// One resource parameter failing one phase.
#[derive(Debug, Error)]
#[error("{phase} {key} ({type_name}): {source}")]
pub struct PhaseError {
    pub phase: Phase,
    pub key: String,
    pub type_name: &'static str,
    #[source]
    pub source: BoxError,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("configuring resources:\n{0}")]
    Configure(MultiError<PhaseError>),

    #[error("resource {key} was not configured")]
    NotConfigured { key: String },

    /// Acquisition stopped at `failed`; everything acquired before it was shut down.
    #[error("{failed}")]
    Acquire {
        failed: PhaseError,
        rollback: MultiError<PhaseError>,
    },

    #[error("shutting down resources:\n{0}")]
    Shutdown(MultiError<PhaseError>),
}

impl LifecycleError {
    /// Every phase failure carried by this error, rollback failures included.
    pub fn phase_errors(&self) -> Vec<&PhaseError> {
        match self {
            LifecycleError::Configure(errors) | LifecycleError::Shutdown(errors) => {
                errors.iter().collect()
            }
            LifecycleError::NotConfigured { .. } => Vec::new(),
            LifecycleError::Acquire { failed, rollback } => {
                std::iter::once(failed).chain(rollback.iter()).collect()
            }
        }
    }
}
