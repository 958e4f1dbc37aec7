//! Background consumer loops for the submission worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::SubmissionWorker;
use crate::config::WorkerConfig;
use crate::queue::QueueConsumer;

/// Current status of the worker pool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkerPoolStatus {
    /// Whether the consumer loops are running.
    pub running: bool,
    /// Number of consumer loops.
    pub consumers: usize,
    pub max_delivery_attempts: u32,
}

/// Runs `consumers` loops of [`SubmissionWorker::run_consumer`] sharing one consumer handle.
pub struct WorkerPool {
    worker: Arc<SubmissionWorker>,
    consumer: Arc<dyn QueueConsumer>,
    config: WorkerConfig,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(
        worker: Arc<SubmissionWorker>,
        consumer: Arc<dyn QueueConsumer>,
        config: WorkerConfig,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            worker,
            consumer,
            config,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Start the consumer loops (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Worker pool already running");
            return;
        }

        let consumers = self.config.consumers.max(1);
        info!(consumers, "Starting submission worker pool");

        let mut handles = self.handles.lock().await;
        for index in 0..consumers {
            let worker = Arc::clone(&self.worker);
            let consumer = Arc::clone(&self.consumer);
            let max_attempts = self.config.max_delivery_attempts;
            let shutdown_rx = self.shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                info!(consumer = index, "Consumer loop started");
                worker.run_consumer(consumer, max_attempts, shutdown_rx).await;
                info!(consumer = index, "Consumer loop stopped");
            }));
        }
    }

    /// Stop the consumer loops and wait for them to finish their current message.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Worker pool not running");
            return;
        }

        info!("Stopping submission worker pool");

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(());

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "Consumer loop ended abnormally");
            }
        }

        info!("Submission worker pool stopped");
    }

    pub fn status(&self) -> WorkerPoolStatus {
        WorkerPoolStatus {
            running: self.running.load(Ordering::Relaxed),
            consumers: self.config.consumers,
            max_delivery_attempts: self.config.max_delivery_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::submission::SqliteSubmissionStore;
    use crate::testing::MockTicketStore;

    fn pool(consumers: usize) -> WorkerPool {
        let store = Arc::new(SqliteSubmissionStore::in_memory().unwrap());
        let tickets = Arc::new(MockTicketStore::new());
        let worker = Arc::new(SubmissionWorker::new(store, tickets));
        let queue = Arc::new(MemoryQueue::new(8));
        WorkerPool::new(
            worker,
            queue,
            WorkerConfig {
                enabled: true,
                consumers,
                max_delivery_attempts: 3,
            },
        )
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let pool = pool(2);
        assert!(!pool.status().running);

        pool.start().await;
        let status = pool.status();
        assert!(status.running);
        assert_eq!(status.consumers, 2);
        assert_eq!(status.max_delivery_attempts, 3);

        pool.stop().await;
        assert!(!pool.status().running);
        assert!(pool.handles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_double_start_and_stop_are_harmless() {
        let pool = pool(1);
        pool.start().await;
        pool.start().await;
        assert_eq!(pool.handles.lock().await.len(), 1);

        pool.stop().await;
        pool.stop().await;
        assert!(!pool.status().running);
    }
}
