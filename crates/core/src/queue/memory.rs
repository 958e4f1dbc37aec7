//! In-process queue transport.
//!
//! Backed by a bounded tokio channel. Publishing waits for capacity, so a full
//! queue behaves like a slow broker and is bounded by the publisher's timeout.
//! Negative acknowledgements go to a separate unbounded lane with the attempt
//! counter incremented. The consumer drains that lane first, so a nack never
//! waits on publishers for capacity.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use super::{Delivery, QueueConsumer, QueueError, QueueMessage, QueueTransport};

const MEMORY_TOPIC: &str = "memory";

struct Receivers {
    published: mpsc::Receiver<Delivery>,
    redeliveries: mpsc::UnboundedReceiver<Delivery>,
}

/// Bounded in-memory queue implementing both producer and consumer sides.
pub struct MemoryQueue {
    tx: mpsc::Sender<Delivery>,
    redelivery_tx: mpsc::UnboundedSender<Delivery>,
    rx: Mutex<Receivers>,
    redeliveries: AtomicUsize,
    next_offset: AtomicI64,
}

impl MemoryQueue {
    /// Create a queue that holds up to `capacity` undelivered messages.
    pub fn new(capacity: usize) -> Self {
        let (tx, published) = mpsc::channel(capacity.max(1));
        let (redelivery_tx, redeliveries) = mpsc::unbounded_channel();
        Self {
            tx,
            redelivery_tx,
            rx: Mutex::new(Receivers {
                published,
                redeliveries,
            }),
            redeliveries: AtomicUsize::new(0),
            next_offset: AtomicI64::new(0),
        }
    }

    /// Number of messages waiting to be delivered, redeliveries included.
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity() + self.pending_redeliveries()
    }

    /// Number of nacked deliveries waiting to be handed out again.
    pub fn pending_redeliveries(&self) -> usize {
        self.redeliveries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueueTransport for MemoryQueue {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(
        &self,
        key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), QueueError> {
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        let delivery = Delivery {
            message: QueueMessage {
                key: key.to_string(),
                value: payload.to_vec(),
                headers: headers.clone(),
                timestamp: Utc::now(),
            },
            attempt: 1,
            topic: MEMORY_TOPIC.to_string(),
            partition: 0,
            offset,
        };

        self.tx.send(delivery).await.map_err(|_| QueueError::Closed)?;
        debug!(key, offset, "Message enqueued");
        Ok(())
    }
}

#[async_trait]
impl QueueConsumer for MemoryQueue {
    async fn recv(&self) -> Result<Option<Delivery>, QueueError> {
        let mut rx = self.rx.lock().await;
        let Receivers {
            published,
            redeliveries,
        } = &mut *rx;

        tokio::select! {
            biased;
            Some(delivery) = redeliveries.recv() => {
                self.redeliveries.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(delivery))
            }
            delivery = published.recv() => Ok(delivery),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        debug!(offset = delivery.offset, "Delivery acknowledged");
        Ok(())
    }

    async fn nack(&self, mut delivery: Delivery) -> Result<(), QueueError> {
        delivery.attempt += 1;
        debug!(
            offset = delivery.offset,
            attempt = delivery.attempt,
            "Delivery returned for redelivery"
        );
        self.redeliveries.fetch_add(1, Ordering::SeqCst);
        if self.redelivery_tx.send(delivery).is_err() {
            self.redeliveries.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}
