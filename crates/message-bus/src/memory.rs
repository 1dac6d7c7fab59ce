//! In-process message bus.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use crate::{
    Acknowledger, BusError, Delivery, Message, MessageBus, MessageId, Result, Subscription,
};

/// How negatively acknowledged messages are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Total number of deliveries before a message is dropped.
    pub max_deliveries: u32,
    /// Pause before a nacked message is handed out again.
    pub delay: Duration,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_deliveries: 10,
            delay: Duration::from_millis(100),
        }
    }
}

/// Messages kept per topic for consumer groups that subscribe late.
pub const DEFAULT_RETAINED_PER_TOPIC: usize = 1024;

struct GroupQueue {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
}

#[derive(Default)]
struct TopicState {
    log: VecDeque<Message>,
    groups: HashMap<String, GroupQueue>,
}

struct Inner {
    topics: Mutex<HashMap<String, TopicState>>,
    policy: RedeliveryPolicy,
    retained_per_topic: usize,
    fail_on_publish: AtomicBool,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            topics: Mutex::default(),
            policy: RedeliveryPolicy::default(),
            retained_per_topic: DEFAULT_RETAINED_PER_TOPIC,
            fail_on_publish: AtomicBool::new(false),
        }
    }
}

/// In-memory message bus for tests and local single-process runs.
///
/// Every topic keeps a log of the most recent messages, capped at
/// `retained_per_topic`. A consumer group gets its own queue the first time
/// one of its members subscribes, seeded with whatever the log still holds,
/// and receives every later publish. Members of the same group compete for
/// the queue. Nothing is durable: a restart loses every message.
#[derive(Clone, Default)]
pub struct InMemoryMessageBus {
    inner: Arc<Inner>,
}

impl InMemoryMessageBus {
    /// Creates a bus with the default redelivery policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bus with a custom redelivery policy.
    pub fn with_policy(policy: RedeliveryPolicy) -> Self {
        Self::with_limits(policy, DEFAULT_RETAINED_PER_TOPIC)
    }

    /// Creates a bus with a custom redelivery policy and per-topic log cap.
    pub fn with_limits(policy: RedeliveryPolicy, retained_per_topic: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                retained_per_topic,
                ..Inner::default()
            }),
        }
    }

    /// Returns the retained messages of a topic, oldest first.
    pub async fn published(&self, topic: &str) -> Vec<Message> {
        self.inner
            .topics
            .lock()
            .await
            .get(topic)
            .map(|state| state.log.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Configures the bus to reject every publish until reset.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<MessageId> {
        if self.inner.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::PublishFailed {
                topic: topic.to_string(),
                reason: "broker unavailable".to_string(),
            });
        }

        let message = Message::new(topic, key.map(str::to_string), payload);
        let id = message.id;

        let mut topics = self.inner.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        for queue in state.groups.values() {
            // The receiver lives as long as the group entry, so sending cannot fail.
            let _ = queue.sender.send(message.clone());
        }
        state.log.push_back(message);
        while state.log.len() > self.inner.retained_per_topic {
            state.log.pop_front();
        }

        tracing::debug!(%topic, message_id = %id, "message published");
        Ok(id)
    }

    async fn subscribe(&self, topic: &str, group: &str) -> Result<Box<dyn Subscription>> {
        let mut topics = self.inner.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();

        let TopicState { log, groups } = state;
        let queue = groups.entry(group.to_string()).or_insert_with(|| {
            let (sender, receiver) = mpsc::unbounded_channel();
            for message in log.iter() {
                let _ = sender.send(message.clone());
            }
            GroupQueue {
                sender,
                receiver: Arc::new(Mutex::new(receiver)),
            }
        });

        tracing::debug!(%topic, %group, "subscribed");
        Ok(Box::new(InMemorySubscription {
            receiver: queue.receiver.clone(),
            requeue: queue.sender.clone(),
            policy: self.inner.policy,
        }))
    }
}

struct InMemorySubscription {
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Message>>>,
    requeue: mpsc::UnboundedSender<Message>,
    policy: RedeliveryPolicy,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Option<Delivery> {
        let message = self.receiver.lock().await.recv().await?;
        Some(Delivery::new(
            message,
            Box::new(InMemoryAcknowledger {
                requeue: self.requeue.clone(),
                policy: self.policy,
            }),
        ))
    }
}

struct InMemoryAcknowledger {
    requeue: mpsc::UnboundedSender<Message>,
    policy: RedeliveryPolicy,
}

impl Acknowledger for InMemoryAcknowledger {
    fn ack(self: Box<Self>, _message: &Message) {}

    fn nack(self: Box<Self>, mut message: Message) {
        if message.attempt >= self.policy.max_deliveries {
            tracing::error!(
                topic = %message.topic,
                message_id = %message.id,
                attempts = message.attempt,
                "redelivery limit reached, dropping message"
            );
            metrics::counter!("bus_messages_dropped_total", "topic" => message.topic.clone())
                .increment(1);
            return;
        }

        message.attempt += 1;
        metrics::counter!("bus_messages_redelivered_total", "topic" => message.topic.clone())
            .increment(1);

        let requeue = self.requeue;
        let delay = self.policy.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = requeue.send(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn next(subscription: &mut Box<dyn Subscription>) -> Delivery {
        tokio::time::timeout(Duration::from_secs(1), subscription.next())
            .await
            .expect("no delivery within timeout")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn test_publish_then_subscribe_replays_log() {
        let bus = InMemoryMessageBus::new();
        bus.publish("orders", Some("1"), b"first".to_vec()).await.unwrap();

        let mut sub = bus.subscribe("orders", "g").await.unwrap();
        bus.publish("orders", Some("2"), b"second".to_vec()).await.unwrap();

        let first = next(&mut sub).await;
        assert_eq!(first.message().payload, b"first");
        assert_eq!(first.message().key.as_deref(), Some("1"));
        first.ack();

        let second = next(&mut sub).await;
        assert_eq!(second.message().payload, b"second");
        second.ack();
    }

    #[tokio::test]
    async fn test_each_group_receives_every_message() {
        let bus = InMemoryMessageBus::new();
        let mut a = bus.subscribe("orders", "a").await.unwrap();
        let mut b = bus.subscribe("orders", "b").await.unwrap();

        bus.publish("orders", None, b"x".to_vec()).await.unwrap();

        assert_eq!(next(&mut a).await.message().payload, b"x");
        assert_eq!(next(&mut b).await.message().payload, b"x");
    }

    #[tokio::test]
    async fn test_group_members_compete() {
        let bus = InMemoryMessageBus::new();
        let mut first = bus.subscribe("orders", "g").await.unwrap();
        let mut second = bus.subscribe("orders", "g").await.unwrap();

        bus.publish("orders", None, b"only".to_vec()).await.unwrap();

        next(&mut first).await.ack();
        let nothing = tokio::time::timeout(Duration::from_millis(50), second.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_next_attempt() {
        let bus = InMemoryMessageBus::with_policy(RedeliveryPolicy {
            max_deliveries: 3,
            delay: Duration::from_millis(1),
        });
        let mut sub = bus.subscribe("orders", "g").await.unwrap();
        let id = bus.publish("orders", None, b"retry me".to_vec()).await.unwrap();

        let delivery = next(&mut sub).await;
        assert_eq!(delivery.message().attempt, 1);
        delivery.nack();

        let redelivered = next(&mut sub).await;
        assert_eq!(redelivered.message().id, id);
        assert_eq!(redelivered.message().attempt, 2);
        redelivered.ack();
    }

    #[tokio::test]
    async fn test_message_is_dropped_after_max_deliveries() {
        let bus = InMemoryMessageBus::with_policy(RedeliveryPolicy {
            max_deliveries: 2,
            delay: Duration::from_millis(1),
        });
        let mut sub = bus.subscribe("orders", "g").await.unwrap();
        bus.publish("orders", None, b"poison".to_vec()).await.unwrap();

        next(&mut sub).await.nack();
        next(&mut sub).await.nack();

        let nothing = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn test_log_keeps_only_most_recent_messages() {
        let bus = InMemoryMessageBus::with_limits(RedeliveryPolicy::default(), 2);
        for payload in [b"1", b"2", b"3"] {
            bus.publish("orders", None, payload.to_vec()).await.unwrap();
        }

        let retained: Vec<_> = bus
            .published("orders")
            .await
            .into_iter()
            .map(|m| m.payload)
            .collect();
        assert_eq!(retained, vec![b"2".to_vec(), b"3".to_vec()]);

        let mut late = bus.subscribe("orders", "late").await.unwrap();
        assert_eq!(next(&mut late).await.message().payload, b"2");
        assert_eq!(next(&mut late).await.message().payload, b"3");
    }

    #[tokio::test]
    async fn test_fail_on_publish() {
        let bus = InMemoryMessageBus::new();
        bus.set_fail_on_publish(true);

        let result = bus.publish("orders", None, b"lost".to_vec()).await;
        assert!(matches!(result, Err(BusError::PublishFailed { .. })));
        assert!(bus.published("orders").await.is_empty());

        bus.set_fail_on_publish(false);
        bus.publish("orders", None, b"kept".to_vec()).await.unwrap();
        assert_eq!(bus.published("orders").await.len(), 1);
    }
}
