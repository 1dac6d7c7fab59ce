//! Order lifecycle orchestration.
//!
//! Two independent paths meet at the order store:
//! 1. The command path ([`OrderCommandService`]) validates toppings, persists a
//!    new order in PREPARING and announces it on `order_created`.
//! 2. The event path ([`OrderEventOrchestrator`]) consumes `order_ready` and
//!    `order_failed` and applies the outcome with a conditional update that
//!    only matches orders still in PREPARING.
//!
//! Correctness under duplicate or reordered delivery rests entirely on that
//! conditional update: the first outcome to reach the store wins and every
//! later one is discarded.

pub mod command;
pub mod error;
pub mod orchestrator;

pub use command::{CreatedOrder, Notification, OrderCommandService, Timeouts};
pub use error::{OrchestratorError, ServiceError};
pub use orchestrator::{OrderEventOrchestrator, OutcomeHandler, Transition};
