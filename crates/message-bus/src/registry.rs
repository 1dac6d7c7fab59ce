//! Topic → handler registry and listener tasks.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{BusError, Delivery, Message, MessageBus, Result, Subscription};

/// Why a handler could not process a message.
#[derive(Debug, Clone, Error)]
pub enum HandlerError {
    /// Processing may succeed later; the message is nacked for redelivery.
    #[error("Retryable handler failure: {0}")]
    Retryable(String),

    /// Processing can never succeed (e.g. undecodable payload); the message
    /// is logged and acknowledged so it is not redelivered.
    #[error("Fatal handler failure: {0}")]
    Fatal(String),
}

/// Consumes messages from one topic.
///
/// Handlers are invoked concurrently and may see the same message more than
/// once, so they must be idempotent.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Returns the name of this handler, used in logs.
    fn name(&self) -> &'static str;

    /// Handles a single message.
    async fn handle(&self, message: &Message) -> std::result::Result<(), HandlerError>;
}

struct Route {
    topic: String,
    handler: Arc<dyn MessageHandler>,
}

/// Maps topic names to handlers for one consumer group.
///
/// Built at process start, then started against a bus, which spawns the
/// listener tasks.
pub struct SubscriptionRegistry {
    group: String,
    concurrency: usize,
    routes: Vec<Route>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry for a consumer group, with one listener per topic.
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            concurrency: 1,
            routes: Vec::new(),
        }
    }

    /// Sets the number of concurrent listeners per topic (at least one).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Binds a handler to a topic. A topic can have only one handler.
    pub fn register(
        &mut self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<&mut Self> {
        let topic = topic.into();
        if self.routes.iter().any(|r| r.topic == topic) {
            return Err(BusError::DuplicateSubscription(topic));
        }
        self.routes.push(Route { topic, handler });
        Ok(self)
    }

    /// Returns the registered topics in registration order.
    pub fn topics(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.topic.as_str()).collect()
    }

    /// Subscribes every route and spawns its listener tasks.
    ///
    /// Fails without spawning anything if any subscription cannot be made.
    #[tracing::instrument(skip(self, bus), fields(group = %self.group))]
    pub async fn start<B: MessageBus + ?Sized>(self, bus: &B) -> Result<RunningSubscriptions> {
        let mut listeners = Vec::new();
        for route in &self.routes {
            for _ in 0..self.concurrency {
                let subscription = bus.subscribe(&route.topic, &self.group).await?;
                listeners.push((route.topic.clone(), route.handler.clone(), subscription));
            }
        }

        let (shutdown, _) = watch::channel(false);
        let tasks = listeners
            .into_iter()
            .map(|(topic, handler, subscription)| {
                tokio::spawn(listen(topic, handler, subscription, shutdown.subscribe()))
            })
            .collect::<Vec<_>>();

        tracing::info!(
            topics = ?self.topics(),
            listeners = tasks.len(),
            "subscriptions started"
        );

        Ok(RunningSubscriptions { shutdown, tasks })
    }
}

/// Handle on the listener tasks spawned by [`SubscriptionRegistry::start`].
///
/// Dropping it also stops the listeners, without waiting for them.
pub struct RunningSubscriptions {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningSubscriptions {
    /// Returns the number of listener tasks.
    pub fn listener_count(&self) -> usize {
        self.tasks.len()
    }

    /// Signals every listener to stop and waits for them.
    ///
    /// A message being handled when the signal arrives is finished first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in futures_util::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "listener task failed");
            }
        }
        tracing::info!("subscriptions stopped");
    }
}

async fn listen(
    topic: String,
    handler: Arc<dyn MessageHandler>,
    mut subscription: Box<dyn Subscription>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            delivery = subscription.next() => {
                let Some(delivery) = delivery else {
                    tracing::warn!(%topic, "subscription closed");
                    break;
                };
                let span = tracing::info_span!(
                    "message",
                    %topic,
                    handler = handler.name(),
                    message_id = %delivery.message().id,
                    attempt = delivery.message().attempt,
                );
                dispatch(&topic, handler.as_ref(), delivery)
                    .instrument(span)
                    .await;
            }
        }
    }
}

async fn dispatch(topic: &str, handler: &dyn MessageHandler, delivery: Delivery) {
    match handler.handle(delivery.message()).await {
        Ok(()) => delivery.ack(),
        Err(HandlerError::Retryable(reason)) => {
            tracing::warn!(%reason, "message not handled, requesting redelivery");
            delivery.nack();
        }
        Err(HandlerError::Fatal(reason)) => {
            tracing::error!(
                %reason,
                payload = %delivery.message().payload_str(),
                "message rejected"
            );
            metrics::counter!("bus_messages_rejected_total", "topic" => topic.to_string())
                .increment(1);
            delivery.ack();
        }
    }
}
