//! Consumer side: turns submission messages into tickets.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::coordinator::save_best_effort;
use super::{
    Submission, SubmissionError, SubmissionMessage, SubmissionStatus, SubmissionStore,
    SubmissionStoreError, SUBMITTED_AT_HEADER,
};
use crate::metrics;
use crate::queue::{Delivery, QueueConsumer, QueueMessage};
use crate::ticket::TicketStore;

/// Pause after a failed receive before trying again.
const RECV_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Saves attempted when recording a completed submission.
const COMPLETION_SAVE_ATTEMPTS: u32 = 3;

/// Materializes tickets from queued submissions.
///
/// Handling is idempotent per submission: a completed submission is never
/// processed twice, and progress is checkpointed before the ticket is created.
pub struct SubmissionWorker {
    store: Arc<dyn SubmissionStore>,
    tickets: Arc<dyn TicketStore>,
}

impl SubmissionWorker {
    pub fn new(store: Arc<dyn SubmissionStore>, tickets: Arc<dyn TicketStore>) -> Self {
        Self { store, tickets }
    }

    /// Process one submission message.
    ///
    /// Unknown and already completed submissions are skipped with `Ok(())`.
    /// Malformed messages and payloads are reported as `Validation` errors.
    pub fn handle_message(&self, message: &QueueMessage) -> Result<(), SubmissionError> {
        let decoded = match SubmissionMessage::decode(&message.value) {
            Ok(decoded) => decoded,
            Err(e) => {
                metrics::WORKER_MESSAGES.with_label_values(&["invalid"]).inc();
                return Err(e);
            }
        };
        let submission_id = decoded.submission_id.as_str();

        let mut submission = match self.store.find_by_id(submission_id) {
            Ok(submission) => submission,
            Err(SubmissionStoreError::NotFound(_)) => {
                warn!(submission_id, "Submission not found, skipping message");
                metrics::WORKER_MESSAGES.with_label_values(&["skipped"]).inc();
                return Ok(());
            }
            Err(e) => {
                metrics::WORKER_MESSAGES.with_label_values(&["failed"]).inc();
                return Err(e.into());
            }
        };

        if submission.status == SubmissionStatus::Completed {
            debug!(submission_id, "Submission already completed, skipping message");
            metrics::WORKER_MESSAGES.with_label_values(&["skipped"]).inc();
            return Ok(());
        }

        submission.mark_processing();
        if let Err(e) = self.store.save(&mut submission) {
            metrics::WORKER_MESSAGES.with_label_values(&["failed"]).inc();
            return Err(e.into());
        }

        let new_ticket = match submission.to_new_ticket() {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(submission_id, error = %e, "Submission payload is invalid");
                submission.mark_failed(e.to_string());
                save_best_effort(self.store.as_ref(), &mut submission, "invalid payload");
                metrics::WORKER_MESSAGES.with_label_values(&["invalid"]).inc();
                return Err(e);
            }
        };

        let ticket = match self.tickets.create(new_ticket) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(submission_id, error = %e, "Failed to create ticket");
                submission.mark_failed(e.to_string());
                save_best_effort(self.store.as_ref(), &mut submission, "ticket creation failure");
                metrics::WORKER_MESSAGES.with_label_values(&["failed"]).inc();
                return Err(e.into());
            }
        };

        submission.mark_completed(ticket.id.as_str());
        if let Err(e) = self.record_completion(&mut submission) {
            error!(
                submission_id,
                ticket_id = %ticket.id,
                error = %e,
                "Ticket created but submission could not be marked completed, acknowledging without redelivery"
            );
            metrics::WORKER_MESSAGES.with_label_values(&["failed"]).inc();
            return Err(SubmissionError::CompletionNotRecorded {
                ticket_id: ticket.id,
                reason: e.to_string(),
            });
        }

        info!(submission_id, ticket_id = %ticket.id, "Processed submission");
        metrics::WORKER_MESSAGES.with_label_values(&["completed"]).inc();
        Ok(())
    }

    /// Save a completed submission, retrying a few times. The ticket already
    /// exists, so this write must not be given up on lightly.
    fn record_completion(&self, submission: &mut Submission) -> Result<(), SubmissionStoreError> {
        let mut attempt = 1;
        loop {
            match self.store.save(submission) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < COMPLETION_SAVE_ATTEMPTS => {
                    warn!(
                        submission_id = %submission.id,
                        attempt,
                        error = %e,
                        "Failed to save completed submission, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Pull deliveries from `consumer` until `shutdown` fires or the queue closes.
    ///
    /// Handler errors never stop the loop. Successful and permanently invalid
    /// deliveries are acknowledged; anything else is handed back for
    /// redelivery until it has been attempted `max_delivery_attempts` times.
    pub async fn run_consumer(
        &self,
        consumer: Arc<dyn QueueConsumer>,
        max_delivery_attempts: u32,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Submission consumer started");
        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Submission consumer received shutdown signal");
                    break;
                }
                received = consumer.recv() => received,
            };

            match received {
                Ok(Some(delivery)) => {
                    if shutdown_requested(&mut shutdown) {
                        if let Err(e) = consumer.nack(delivery).await {
                            warn!(error = %e, "Failed to return delivery on shutdown");
                        }
                        break;
                    }
                    self.process_delivery(consumer.as_ref(), delivery, max_delivery_attempts)
                        .await;
                }
                Ok(None) => {
                    info!("Queue closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive from queue");
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(RECV_ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("Submission consumer stopped");
    }

    async fn process_delivery(
        &self,
        consumer: &dyn QueueConsumer,
        delivery: Delivery,
        max_delivery_attempts: u32,
    ) {
        observe_delivery_lag(&delivery.message);

        let timer = metrics::HANDLE_DURATION.start_timer();
        let result = self.handle_message(&delivery.message);
        timer.observe_duration();

        let settled = match result {
            Ok(()) => consumer.ack(&delivery).await,
            Err(e) if e.is_permanent() => {
                error!(
                    key = %delivery.message.key,
                    offset = delivery.offset,
                    error = %e,
                    "Dead-lettering submission message that cannot be retried"
                );
                metrics::DEAD_LETTERED.inc();
                consumer.ack(&delivery).await
            }
            Err(e) if delivery.attempt >= max_delivery_attempts => {
                error!(
                    key = %delivery.message.key,
                    attempt = delivery.attempt,
                    error = %e,
                    "Dead-lettering submission message after repeated failures"
                );
                metrics::DEAD_LETTERED.inc();
                consumer.ack(&delivery).await
            }
            Err(e) => {
                warn!(
                    key = %delivery.message.key,
                    attempt = delivery.attempt,
                    error = %e,
                    "Submission handling failed, returning for redelivery"
                );
                consumer.nack(delivery).await
            }
        };

        if let Err(e) = settled {
            warn!(error = %e, "Failed to settle delivery");
        }
    }
}

/// A shutdown was signalled (or its sender dropped) but not yet observed.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

fn observe_delivery_lag(message: &QueueMessage) {
    let Some(submitted_at) = message.header(SUBMITTED_AT_HEADER) else {
        return;
    };
    match DateTime::parse_from_rfc3339(submitted_at) {
        Ok(submitted_at) => {
            let lag = Utc::now() - submitted_at.with_timezone(&Utc);
            if let Ok(lag) = lag.to_std() {
                metrics::DELIVERY_LAG.observe(lag.as_secs_f64());
            }
        }
        Err(e) => debug!(error = %e, "Unparseable submitted_at header"),
    }
}
