//! Mock queue transport for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::queue::{QueueError, QueueMessage, QueueTransport};

/// Mock implementation of the QueueTransport trait.
///
/// Provides controllable behavior for testing:
/// - Record accepted messages for assertions
/// - Fail the next publish with a chosen error
/// - Delay publishes to exercise timeouts
///
/// # Example
///
/// ```rust,ignore
/// use pflow_core::testing::MockQueue;
///
/// let queue = MockQueue::new();
/// queue.fail_next_publish(QueueError::Publish("broker down".into()));
///
/// // ... submit through a coordinator ...
///
/// assert!(queue.published().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct MockQueue {
    /// Messages the queue accepted.
    published: Mutex<Vec<QueueMessage>>,
    /// If set, the next publish fails with this error.
    next_error: Mutex<Option<QueueError>>,
    /// Simulated publish latency.
    delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockQueue {
    /// Create a new mock queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages accepted so far, in publish order.
    pub fn published(&self) -> Vec<QueueMessage> {
        lock(&self.published).clone()
    }

    /// Get the number of accepted messages.
    pub fn publish_count(&self) -> usize {
        lock(&self.published).len()
    }

    /// Clear recorded messages.
    pub fn clear(&self) {
        lock(&self.published).clear();
    }

    /// Configure the next publish to fail with the given error.
    pub fn fail_next_publish(&self, error: QueueError) {
        *lock(&self.next_error) = Some(error);
    }

    /// Delay every publish by `delay`.
    pub fn set_publish_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }
}

#[async_trait]
impl QueueTransport for MockQueue {
    fn name(&self) -> &str {
        "mock"
    }

    async fn publish(
        &self,
        key: &str,
        payload: &[u8],
        headers: &HashMap<String, String>,
    ) -> Result<(), QueueError> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }

        lock(&self.published).push(QueueMessage {
            key: key.to_string(),
            value: payload.to_vec(),
            headers: headers.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    }
}
