//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, timestamp_now};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus, Toppings};

/// Order aggregate root.
///
/// Identity and toppings are fixed at creation. Status only ever moves along
/// PREPARING → READY or PREPARING → FAILED. `version` is 0 until the first
/// persisted write and is advanced by the order store on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    toppings: Toppings,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    version: i64,
    failure_reason: Option<String>,
}

impl Order {
    /// Creates a new, not yet persisted order in PREPARING status with a fresh id.
    pub fn new(toppings: Toppings) -> Self {
        Self::with_id(OrderId::new(), toppings)
    }

    /// Creates a new, not yet persisted order with the given id.
    pub fn with_id(id: OrderId, toppings: Toppings) -> Self {
        Self {
            id,
            toppings,
            status: OrderStatus::Preparing,
            created_at: timestamp_now(),
            updated_at: None,
            version: 0,
            failure_reason: None,
        }
    }

    /// Rebuilds an order from its stored fields.
    pub fn restore(
        id: OrderId,
        toppings: Toppings,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: Option<DateTime<Utc>>,
        version: i64,
        failure_reason: Option<String>,
    ) -> Self {
        Self {
            id,
            toppings,
            status,
            created_at,
            updated_at,
            version,
            failure_reason,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> &OrderId {
        &self.id
    }

    pub fn toppings(&self) -> &Toppings {
        &self.toppings
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Optimistic concurrency version; 0 means never persisted.
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Reason recorded with a FAILED status.
    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Returns true if the order reached READY or FAILED.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Mutations
impl Order {
    /// Moves the order to `next`, recording `failure_reason` when the target is FAILED.
    ///
    /// The reason is dropped for any other target so that it is only ever
    /// present alongside a FAILED status.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        failure_reason: Option<String>,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        self.failure_reason = match next {
            OrderStatus::Failed => failure_reason,
            _ => None,
        };
        Ok(())
    }

    /// Marks the order as ready.
    pub fn mark_ready(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Ready, None)
    }

    /// Marks the order as failed with the given reason.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Failed, Some(reason.into()))
    }

    /// Records a persisted write: bumps the version and stamps `updated_at`.
    ///
    /// Called by order store implementations only.
    pub fn record_write(&mut self, at: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = Some(at);
    }
}
