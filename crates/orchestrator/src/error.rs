//! Orchestration error types.

use std::time::Duration;

use domain::ValidationError;
use message_bus::HandlerError;
use order_store::StoreError;
use thiserror::Error;

/// Errors that can occur on the command path.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request was rejected by validation; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The order store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The order store did not answer in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

/// Errors that can occur while applying an outcome event.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The event payload could not be decoded.
    #[error("Malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// The order store failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    /// The order store did not answer in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl From<OrchestratorError> for HandlerError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Decode(_) => HandlerError::Fatal(err.to_string()),
            OrchestratorError::Persistence(_) | OrchestratorError::Timeout { .. } => {
                HandlerError::Retryable(err.to_string())
            }
        }
    }
}

/// Convenience type alias for orchestration results.
pub type Result<T> = std::result::Result<T, OrchestratorError>;
