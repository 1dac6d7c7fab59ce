//! Shared types for the order service.

mod topics;
mod types;

pub use topics::{ORDER_CREATED, ORDER_FAILED, ORDER_READY};
pub use types::{OrderId, timestamp_now};
