//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use events::{DEFAULT_FAILURE_REASON, OrderCreatedEvent, OrderOutcomeEvent};
pub use state::{OrderStatus, UnknownStatus};
pub use value_objects::Toppings;

use thiserror::Error;

/// Errors that can occur when mutating an order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status change is not an edge of the state machine.
    #[error("Invalid state transition: cannot move from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },
}
