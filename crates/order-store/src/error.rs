use common::OrderId;
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write carried a version that no longer matches the stored one.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual:?}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: i64,
        actual: Option<i64>,
    },

    /// The order was not found in the store.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// The store cannot be reached.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored row could not be turned back into an order.
    #[error("Corrupt order row {order_id}: {reason}")]
    Corrupt { order_id: String, reason: String },
}

impl StoreError {
    /// Returns true if retrying the same operation later may succeed.
    ///
    /// Only connectivity failures qualify. Decode errors and constraint
    /// violations fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => matches!(
                err,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            _ => false,
        }
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
