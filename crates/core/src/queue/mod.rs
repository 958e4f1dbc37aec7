//! Queue transports connecting the submission coordinator to the workers.

#[cfg(feature = "kafka")]
mod kafka;
mod memory;
mod types;

#[cfg(feature = "kafka")]
pub use kafka::KafkaQueue;
pub use memory::MemoryQueue;
pub use types::{Delivery, QueueConsumer, QueueError, QueueMessage, QueueTransport};
