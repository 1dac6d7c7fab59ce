//! Domain layer for the order service.
//!
//! This crate provides the value objects and the aggregate that govern how an
//! order moves from submission to a terminal outcome:
//! - `Toppings`: validated, canonically ordered set of item names
//! - `OrderStatus`: the PREPARING → READY | FAILED state machine
//! - `Order`: the aggregate root persisted by the order store
//! - `OrderCreatedEvent` / `OrderOutcomeEvent`: broker payloads

pub mod error;
pub mod order;

pub use common::OrderId;
pub use error::{ValidationError, Violation};
pub use order::{
    DEFAULT_FAILURE_REASON, Order, OrderCreatedEvent, OrderError, OrderOutcomeEvent, OrderStatus,
    Toppings, UnknownStatus,
};
