//! Queue transport types.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by queue transports.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The broker rejected or failed to accept the message.
    #[error("publish failed: {0}")]
    Publish(String),

    /// The publish did not complete within the allotted time.
    #[error("publish timed out after {0:?}")]
    Timeout(Duration),

    /// Receiving from the broker failed.
    #[error("consume failed: {0}")]
    Consume(String),

    /// Acknowledging a delivery failed.
    #[error("acknowledge failed: {0}")]
    Ack(String),

    /// The transport has been shut down.
    #[error("queue closed")]
    Closed,

    /// The message body could not be encoded.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The transport could not be created from its configuration.
    #[error("queue configuration error: {0}")]
    Config(String),
}

/// A message as seen by producers and consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Partitioning key.
    pub key: String,
    /// Opaque message body.
    pub value: Vec<u8>,
    /// String headers attached by the producer.
    pub headers: HashMap<String, String>,
    /// Broker timestamp (or enqueue time for in-process transports).
    pub timestamp: DateTime<Utc>,
}

impl QueueMessage {
    /// Look up a header by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

/// A message handed to a consumer, together with what is needed to acknowledge it.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// The delivered message.
    pub message: QueueMessage,
    /// How many times this message has been delivered, starting at 1.
    pub attempt: u32,
    /// Source topic.
    pub topic: String,
    /// Source partition.
    pub partition: i32,
    /// Position within the partition.
    pub offset: i64,
}

/// Producer side of the queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Returns the name of this transport implementation.
    fn name(&self) -> &str;

    /// Publish a message.
    async fn publish(
        &self,
        key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), QueueError>;
}

/// Consumer side of the queue.
///
/// Deliveries are at-least-once: anything not acknowledged may be delivered again,
/// in any order relative to other messages.
#[async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Wait for the next delivery. `Ok(None)` means the queue is closed.
    async fn recv(&self) -> Result<Option<Delivery>, QueueError>;

    /// Mark a delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Give a delivery back so it is redelivered.
    async fn nack(&self, delivery: Delivery) -> Result<(), QueueError>;
}
