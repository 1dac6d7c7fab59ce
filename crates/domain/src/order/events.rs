//! Broker payloads describing order lifecycle changes.

use common::OrderId;
use serde::{Deserialize, Serialize};

use super::{Order, OrderStatus};

/// Reason recorded when an `order_failed` event carries none.
pub const DEFAULT_FAILURE_REASON: &str = "unknown reason";

/// Published on `order_created` once an order has been persisted.
///
/// Carries a full snapshot, including the store-assigned version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order: Order,
}

impl OrderCreatedEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Published by the fulfillment process on `order_ready` / `order_failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderOutcomeEvent {
    /// The order the outcome refers to.
    pub id: OrderId,

    /// Outcome reported by the fulfillment process.
    pub status: OrderStatus,

    /// Present only for FAILED outcomes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl OrderOutcomeEvent {
    /// A READY outcome for the given order.
    pub fn ready(id: OrderId) -> Self {
        Self {
            id,
            status: OrderStatus::Ready,
            failure_reason: None,
        }
    }

    /// A FAILED outcome for the given order.
    pub fn failed(id: OrderId, reason: Option<String>) -> Self {
        Self {
            id,
            status: OrderStatus::Failed,
            failure_reason: reason,
        }
    }

    /// The failure reason, falling back to [`DEFAULT_FAILURE_REASON`].
    pub fn failure_reason_or_default(&self) -> &str {
        self.failure_reason
            .as_deref()
            .unwrap_or(DEFAULT_FAILURE_REASON)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}
