//! Broker traits.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Delivery, MessageId, Result};

/// A consumer's handle on one topic within a consumer group.
#[async_trait]
pub trait Subscription: Send {
    /// Waits for the next delivery. Returns None once the subscription is closed.
    ///
    /// Cancelling the returned future loses no message.
    async fn next(&mut self) -> Option<Delivery>;
}

/// Trait for message bus implementations.
///
/// Delivery is at-least-once: a message may reach a consumer group more than
/// once and deliveries are not ordered across concurrent subscribers, even for
/// the same key. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a payload to a topic, optionally keyed for partitioning.
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<MessageId>;

    /// Subscribes to a topic as a member of a consumer group.
    ///
    /// Each group receives every message; subscriptions within the same group
    /// compete for messages.
    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>>;
}

#[async_trait]
impl<T: MessageBus + ?Sized> MessageBus for Arc<T> {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<MessageId> {
        (**self).publish(topic, key, payload).await
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        (**self).subscribe(topic, group).await
    }
}
