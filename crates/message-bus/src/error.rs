//! Message bus error types.

use thiserror::Error;

/// Errors that can occur during message bus operations.
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Failed to publish a message to a topic.
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    /// A handler is already registered for the topic.
    #[error("A handler is already registered for topic '{0}'")]
    DuplicateSubscription(String),
}

/// Result type for message bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
