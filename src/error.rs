//! Service-level error taxonomy.

use thiserror::Error;

use crate::{state::progress::InvalidTransition, store::StorageError};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend rejected or failed the operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No storage backend is installed (degraded mode).
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// The challenge has not been released yet.
    #[error("challenge not yet released: {0}")]
    NotReleased(String),
    /// The requested progress transition is not legal from the current state.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// Evidence failed the challenge strategy's validation.
    #[error("evidence rejected: {0}")]
    Rejected(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Invalid input provided by the actor.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Requested event, challenge, or participant was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl ServiceError {
    /// Whether this error marks a timer fire that referenced a stale or
    /// already-terminal entity. Such fires are logged and ignored rather than
    /// surfaced.
    pub fn is_stale_fire(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_) | ServiceError::InvalidTransition(_)
        )
    }
}
