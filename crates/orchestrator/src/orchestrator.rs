//! Event path: apply fulfillment outcomes to stored orders.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{ORDER_FAILED, ORDER_READY};
use domain::{OrderOutcomeEvent, OrderStatus};
use message_bus::{BusError, HandlerError, Message, MessageHandler, SubscriptionRegistry};
use order_store::OrderStore;

use crate::error::{OrchestratorError, Result};

/// What an outcome event did to its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order moved out of PREPARING.
    Applied,
    /// The order was already settled or does not exist. Nothing changed.
    Discarded,
}

/// Consumes `order_ready` and `order_failed`.
///
/// Every outcome is applied with a single conditional update from PREPARING,
/// so duplicates, redeliveries and conflicting outcomes for the same order
/// settle it exactly once.
pub struct OrderEventOrchestrator<S> {
    store: S,
    store_timeout: Duration,
}

impl<S: OrderStore> OrderEventOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self::with_store_timeout(store, Duration::from_secs(5))
    }

    pub fn with_store_timeout(store: S, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
        }
    }

    /// Applies an `order_ready` event.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.id))]
    pub async fn apply_ready(&self, event: &OrderOutcomeEvent) -> Result<Transition> {
        self.apply(event, OrderStatus::Ready, None).await
    }

    /// Applies an `order_failed` event, defaulting the reason when absent.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.id))]
    pub async fn apply_failed(&self, event: &OrderOutcomeEvent) -> Result<Transition> {
        let reason = event.failure_reason_or_default().to_string();
        self.apply(event, OrderStatus::Failed, Some(reason)).await
    }

    async fn apply(
        &self,
        event: &OrderOutcomeEvent,
        target: OrderStatus,
        reason: Option<String>,
    ) -> Result<Transition> {
        if event.status != target {
            tracing::warn!(
                payload_status = %event.status,
                topic_status = %target,
                "payload status disagrees with topic, applying topic status"
            );
        }

        let update =
            self.store
                .compare_and_set_status(&event.id, OrderStatus::Preparing, target, reason);
        let changed = tokio::time::timeout(self.store_timeout, update)
            .await
            .map_err(|_| OrchestratorError::Timeout {
                operation: "conditional status update",
                after: self.store_timeout,
            })??;

        let status = target.as_str();
        if changed {
            tracing::info!("Order id '{}' updated to {}", event.id, status);
            metrics::counter!("order_outcomes_applied_total", "status" => status).increment(1);
            Ok(Transition::Applied)
        } else {
            tracing::info!(status = %target, "order unknown or already settled, outcome discarded");
            metrics::counter!("order_outcomes_discarded_total", "status" => status).increment(1);
            Ok(Transition::Discarded)
        }
    }
}

impl<S: OrderStore + 'static> OrderEventOrchestrator<S> {
    /// Binds `order_ready` and `order_failed` to this orchestrator.
    pub fn register(
        self: &Arc<Self>,
        registry: &mut SubscriptionRegistry,
    ) -> std::result::Result<(), BusError> {
        registry
            .register(ORDER_READY, Arc::new(OutcomeHandler::ready(self.clone())))?
            .register(ORDER_FAILED, Arc::new(OutcomeHandler::failed(self.clone())))?;
        Ok(())
    }
}

/// Decodes an outcome message and hands it to the orchestrator.
///
/// Undecodable payloads are fatal. Store failures and timeouts are retryable,
/// which puts the message back on the bus.
pub struct OutcomeHandler<S> {
    orchestrator: Arc<OrderEventOrchestrator<S>>,
    target: OrderStatus,
}

impl<S> OutcomeHandler<S> {
    pub fn ready(orchestrator: Arc<OrderEventOrchestrator<S>>) -> Self {
        Self {
            orchestrator,
            target: OrderStatus::Ready,
        }
    }

    pub fn failed(orchestrator: Arc<OrderEventOrchestrator<S>>) -> Self {
        Self {
            orchestrator,
            target: OrderStatus::Failed,
        }
    }
}

#[async_trait]
impl<S: OrderStore + 'static> MessageHandler for OutcomeHandler<S> {
    fn name(&self) -> &'static str {
        match self.target {
            OrderStatus::Failed => "OrderFailedHandler",
            _ => "OrderReadyHandler",
        }
    }

    async fn handle(&self, message: &Message) -> std::result::Result<(), HandlerError> {
        tracing::info!(payload = %message.payload_str(), "Received order outcome");

        let event = OrderOutcomeEvent::from_json(&message.payload).map_err(OrchestratorError::from)?;
        match self.target {
            OrderStatus::Failed => self.orchestrator.apply_failed(&event).await?,
            _ => self.orchestrator.apply_ready(&event).await?,
        };
        Ok(())
    }
}
