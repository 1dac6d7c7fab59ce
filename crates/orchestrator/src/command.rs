//! Command path: validate, persist, announce.

use std::future::Future;
use std::time::{Duration, Instant};

use common::ORDER_CREATED;
use domain::{Order, OrderCreatedEvent, Toppings};
use message_bus::{MessageBus, MessageId};
use order_store::OrderStore;

use crate::error::ServiceError;

/// Upper bounds on the collaborators of the command path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub store: Duration,
    pub publish: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            store: Duration::from_secs(5),
            publish: Duration::from_secs(5),
        }
    }
}

/// What became of the `order_created` announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Published(MessageId),
    /// The order is persisted but nobody was told. Carries the reason.
    Degraded(String),
}

/// Result of a successful `create_order`.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub notification: Notification,
}

impl CreatedOrder {
    pub fn is_degraded(&self) -> bool {
        matches!(self.notification, Notification::Degraded(_))
    }
}

/// Accepts new orders and lists existing ones.
pub struct OrderCommandService<S, B> {
    store: S,
    bus: B,
    timeouts: Timeouts,
}

impl<S, B> OrderCommandService<S, B>
where
    S: OrderStore,
    B: MessageBus,
{
    pub fn new(store: S, bus: B) -> Self {
        Self::with_timeouts(store, bus, Timeouts::default())
    }

    pub fn with_timeouts(store: S, bus: B, timeouts: Timeouts) -> Self {
        Self {
            store,
            bus,
            timeouts,
        }
    }

    /// Validates the toppings, persists a new PREPARING order and publishes
    /// `order_created` keyed by the order id.
    ///
    /// Nothing is written when validation fails. A failed or timed-out publish
    /// does not undo the write: the order is returned with a degraded
    /// notification.
    #[tracing::instrument(skip(self, toppings), fields(order_id = tracing::field::Empty))]
    pub async fn create_order(&self, toppings: Vec<String>) -> Result<CreatedOrder, ServiceError> {
        let started = Instant::now();

        let toppings = Toppings::new(toppings)?;
        let order = Order::new(toppings);
        tracing::Span::current().record("order_id", tracing::field::display(order.id()));

        let order = bounded(self.timeouts.store, "save order", self.store.save(order)).await??;
        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(toppings = %order.toppings(), "order created");

        let notification = self.announce(&order).await;

        metrics::histogram!("order_create_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        Ok(CreatedOrder {
            order,
            notification,
        })
    }

    /// Returns every order in store order.
    #[tracing::instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(bounded(self.timeouts.store, "list orders", self.store.find_all()).await??)
    }

    async fn announce(&self, order: &Order) -> Notification {
        let payload = match OrderCreatedEvent::new(order.clone()).to_json() {
            Ok(payload) => payload,
            Err(e) => return degraded(format!("could not encode event: {e}")),
        };

        let publish = self
            .bus
            .publish(ORDER_CREATED, Some(order.id().as_str()), payload);
        match tokio::time::timeout(self.timeouts.publish, publish).await {
            Ok(Ok(message_id)) => {
                tracing::info!(topic = ORDER_CREATED, %message_id, "order announced");
                Notification::Published(message_id)
            }
            Ok(Err(e)) => degraded(e.to_string()),
            Err(_) => degraded(format!(
                "publish timed out after {:?}",
                self.timeouts.publish
            )),
        }
    }
}

fn degraded(reason: String) -> Notification {
    tracing::warn!(topic = ORDER_CREATED, %reason, "order persisted but not announced");
    metrics::counter!("order_notifications_degraded_total").increment(1);
    Notification::Degraded(reason)
}

async fn bounded<F: Future>(
    after: Duration,
    operation: &'static str,
    fut: F,
) -> Result<F::Output, ServiceError> {
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| ServiceError::Timeout { operation, after })
}
