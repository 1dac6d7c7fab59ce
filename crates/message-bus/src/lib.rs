//! Message bus abstraction for the order service.
//!
//! Messages are published to named topics and delivered to consumer groups
//! with at-least-once semantics: a consumer acknowledges a delivery once it
//! is handled, or negatively acknowledges it to have it redelivered later.
//! Delivery may be duplicated and is not ordered across listeners, so
//! handlers must be idempotent.
//!
//! - [`MessageBus`] / [`Subscription`]: the broker seam
//! - [`InMemoryMessageBus`]: in-process broker for tests and local runs
//! - [`SubscriptionRegistry`]: explicit topic → handler table, started at
//!   process start and torn down through [`RunningSubscriptions::shutdown`]

pub mod bus;
pub mod error;
pub mod memory;
pub mod message;
pub mod registry;

pub use bus::{MessageBus, Subscription};
pub use error::{BusError, Result};
pub use memory::{DEFAULT_RETAINED_PER_TOPIC, InMemoryMessageBus, RedeliveryPolicy};
pub use message::{Acknowledger, Delivery, Message, MessageId};
pub use registry::{HandlerError, MessageHandler, RunningSubscriptions, SubscriptionRegistry};
