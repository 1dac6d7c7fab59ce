use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::timestamp_now;
use domain::{Order, OrderStatus};
use tokio::sync::RwLock;

use crate::{OrderId, Result, StoreError, store::OrderStore};

/// In-memory order store implementation for testing and local runs.
///
/// Orders are kept in insertion order, which is the order `find_all` returns.
/// Every mutation happens under the write lock, so the conditional update is
/// atomic with respect to concurrent callers.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<Vec<Order>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Makes every subsequent call fail with `StoreError::Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn save(&self, mut order: Order) -> Result<Order> {
        self.check_available()?;

        let mut orders = self.orders.write().await;
        let position = orders.iter().position(|o| o.id() == order.id());

        match (order.version(), position) {
            (0, None) => {
                order.record_write(timestamp_now());
                orders.push(order.clone());
                Ok(order)
            }
            (expected, Some(index)) if orders[index].version() == expected && expected > 0 => {
                order.record_write(timestamp_now());
                orders[index] = order.clone();
                Ok(order)
            }
            (expected, Some(index)) => {
                metrics::counter!("order_store_conflicts_total").increment(1);
                Err(StoreError::ConcurrencyConflict {
                    order_id: order.id().clone(),
                    expected,
                    actual: Some(orders[index].version()),
                })
            }
            (_, None) => Err(StoreError::NotFound(order.id().clone())),
        }
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>> {
        self.check_available()?;

        let orders = self.orders.read().await;
        Ok(orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn find_all(&self) -> Result<Vec<Order>> {
        self.check_available()?;

        Ok(self.orders.read().await.clone())
    }

    async fn compare_and_set_status(
        &self,
        id: &OrderId,
        expected: OrderStatus,
        next: OrderStatus,
        failure_reason: Option<String>,
    ) -> Result<bool> {
        self.check_available()?;

        if !expected.can_transition_to(next) {
            return Ok(false);
        }

        let mut orders = self.orders.write().await;
        let Some(order) = orders.iter_mut().find(|o| o.id() == id) else {
            tracing::debug!(order_id = %id, "conditional update matched no order");
            return Ok(false);
        };

        if order.status() != expected {
            tracing::debug!(
                order_id = %id,
                current = %order.status(),
                %expected,
                "conditional update precondition not met"
            );
            return Ok(false);
        }

        // The precondition and the edge were checked above, so this cannot fail.
        if order.transition(next, failure_reason).is_err() {
            return Ok(false);
        }
        order.record_write(timestamp_now());
        Ok(true)
    }
}
