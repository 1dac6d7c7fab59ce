use std::sync::Arc;

use async_trait::async_trait;
use domain::{Order, OrderStatus};

use crate::{OrderId, Result};

/// Core trait for order store implementations.
///
/// The store is the single source of truth for an order's mutable fields.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists an order.
    ///
    /// An order at version 0 is inserted and comes back at version 1; inserting
    /// an id that already exists is a `ConcurrencyConflict`. An order at
    /// version n > 0 replaces the stored row only if the stored version is
    /// still n, and comes back at n + 1. Every write stamps `updated_at`.
    async fn save(&self, order: Order) -> Result<Order>;

    /// Loads an order by id. Returns None if it does not exist.
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>>;

    /// Returns all orders in store-defined order.
    async fn find_all(&self) -> Result<Vec<Order>>;

    /// Sets the status of `id` to `next` only if its current status is `expected`.
    ///
    /// `failure_reason` is recorded only when `next` is FAILED. On success the
    /// version is incremented and `updated_at` advances. Returns false, without
    /// touching anything, when the id is unknown, the current status differs
    /// from `expected`, or `expected → next` is not an edge of the state machine.
    async fn compare_and_set_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        failure_reason: Option<String>,
    ) -> Result<bool>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn save(&self, order: Order) -> Result<Order> {
        (**self).save(order).await
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        (**self).find_by_id(id).await
    }

    async fn find_all(&self) -> Result<Vec<Order>> {
        (**self).find_all().await
    }

    async fn compare_and_set_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        failure_reason: Option<String>,
    ) -> Result<bool> {
        (**self)
            .compare_and_set_status(id, expected, next, failure_reason)
            .await
    }
}

/// Extension trait providing the lifecycle shortcuts used by the event path.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// PREPARING → READY. Returns true if a row changed.
    async fn set_order_ready(&self, id: &OrderId) -> Result<bool> {
        self.compare_and_set_status(id, OrderStatus::Preparing, OrderStatus::Ready, None)
            .await
    }

    /// PREPARING → FAILED with a reason. Returns true if a row changed.
    async fn set_order_failed(&self, id: &OrderId, reason: String) -> Result<bool> {
        self.compare_and_set_status(id, OrderStatus::Preparing, OrderStatus::Failed, Some(reason))
            .await
    }

    /// Checks if an order exists.
    async fn exists(&self, id: &OrderId) -> Result<bool> {
        Ok(self.find_by_id(id).await?.is_some())
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}
