//! Message broker topic names.

/// Published by the command path after an order has been persisted.
pub const ORDER_CREATED: &str = "order_created";

/// Published by the fulfillment process when an order is ready.
pub const ORDER_READY: &str = "order_ready";

/// Published by the fulfillment process when an order could not be prepared.
pub const ORDER_FAILED: &str = "order_failed";
