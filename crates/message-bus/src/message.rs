//! Messages and deliveries.

use std::borrow::Cow;

use uuid::Uuid;

/// Unique identifier for a published message.
///
/// Redeliveries of the same message keep their id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as seen by publishers and consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub topic: String,
    /// Partitioning key, e.g. the order id.
    pub key: Option<String>,
    pub payload: Vec<u8>,
    /// 1 for the first delivery, incremented on every redelivery.
    pub attempt: u32,
}

impl Message {
    /// Creates a message ready for its first delivery.
    pub fn new(topic: impl Into<String>, key: Option<String>, payload: Vec<u8>) -> Self {
        Self {
            id: MessageId::new(),
            topic: topic.into(),
            key,
            payload,
            attempt: 1,
        }
    }

    /// The payload as text, with invalid UTF-8 replaced. Meant for logging.
    pub fn payload_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Settles a delivery with the broker that produced it.
pub trait Acknowledger: Send {
    /// The message was handled (or deliberately discarded); do not redeliver.
    fn ack(self: Box<Self>, message: &Message);

    /// The message was not handled; the broker should deliver it again.
    fn nack(self: Box<Self>, message: Message);
}

/// A message handed to a consumer, which must be settled with `ack` or `nack`.
pub struct Delivery {
    message: Message,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(message: Message, acker: Box<dyn Acknowledger>) -> Self {
        Self { message, acker }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn ack(self) {
        self.acker.ack(&self.message);
    }

    pub fn nack(self) {
        self.acker.nack(self.message);
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}
