//! Producer side: records submissions and publishes them to the queue.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::SecondsFormat;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{
    Submission, SubmissionError, SubmissionMessage, SubmissionMetrics, SubmissionRequest,
    SubmissionStatus, SubmissionStore, SubmissionStoreError, SUBMITTED_AT_HEADER,
};
use crate::metrics;
use crate::queue::{QueueError, QueueTransport};

/// Publish timeout used unless configured otherwise.
pub const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);

/// Persist a secondary state change, logging instead of failing.
///
/// Used where the caller already has an error to report and a failed write
/// must not mask it.
pub fn save_best_effort(store: &dyn SubmissionStore, submission: &mut Submission, context: &str) {
    if let Err(e) = store.save(submission) {
        error!(
            submission_id = %submission.id,
            status = %submission.status,
            context,
            error = %e,
            "Failed to persist submission state"
        );
    }
}

/// What to do with a submission after intake.
enum Intake {
    /// Already queued, in flight or done. Returned as is.
    Unchanged(Submission),
    /// Needs a publish. Carries the intake outcome counted once it succeeds.
    Enqueue(Submission, &'static str),
}

/// Accepts ticket submissions, deduplicates them and hands them to the queue.
pub struct SubmissionCoordinator {
    store: Arc<dyn SubmissionStore>,
    queue: Arc<dyn QueueTransport>,
    publish_timeout: Duration,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn SubmissionStore>, queue: Arc<dyn QueueTransport>) -> Self {
        Self {
            store,
            queue,
            publish_timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    pub fn with_publish_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    /// Record a submission and enqueue it.
    ///
    /// Resubmitting a client reference whose submission is pending, processing
    /// or completed returns the stored record without publishing again. A
    /// failed submission is reset and published once more.
    pub async fn submit(&self, request: SubmissionRequest) -> Result<Submission, SubmissionError> {
        let reference = request.client_reference.trim();

        let intake = match self.intake(reference, request.payload) {
            Ok(intake) => intake,
            Err(e) => {
                metrics::SUBMISSIONS_RECEIVED
                    .with_label_values(&["error"])
                    .inc();
                return Err(e);
            }
        };

        let (mut submission, outcome) = match intake {
            Intake::Unchanged(existing) => {
                debug!(
                    submission_id = %existing.id,
                    client_reference = %existing.client_reference,
                    status = %existing.status,
                    "Duplicate submission, returning existing record"
                );
                metrics::SUBMISSIONS_RECEIVED
                    .with_label_values(&["duplicate"])
                    .inc();
                return Ok(existing);
            }
            Intake::Enqueue(submission, outcome) => (submission, outcome),
        };

        if let Err(e) = self.publish(&submission).await {
            warn!(
                submission_id = %submission.id,
                error = %e,
                "Failed to publish submission"
            );
            metrics::PUBLISH_FAILURES.inc();
            metrics::SUBMISSIONS_RECEIVED
                .with_label_values(&["publish_failed"])
                .inc();

            submission.mark_failed(e.to_string());
            save_best_effort(self.store.as_ref(), &mut submission, "publish failure");
            return Err(SubmissionError::Transport(e));
        }

        metrics::SUBMISSIONS_RECEIVED
            .with_label_values(&[outcome])
            .inc();
        info!(
            submission_id = %submission.id,
            client_reference = %submission.client_reference,
            queue = self.queue.name(),
            "Submission enqueued"
        );
        Ok(submission)
    }

    /// Get a submission by id.
    pub fn lookup(&self, id: &str) -> Result<Submission, SubmissionError> {
        Ok(self.store.find_by_id(id)?)
    }

    /// Aggregate submission counts and queue age.
    pub fn metrics(&self) -> Result<SubmissionMetrics, SubmissionError> {
        Ok(self.store.metrics()?)
    }

    fn intake(
        &self,
        reference: &str,
        payload: Map<String, Value>,
    ) -> Result<Intake, SubmissionError> {
        if let Some(intake) = self.reuse_existing(reference, &payload)? {
            return Ok(intake);
        }

        let submission = Submission::new(reference, payload);
        match self.store.create(&submission) {
            Ok(()) => Ok(Intake::Enqueue(submission, "enqueued")),
            Err(SubmissionStoreError::Conflict(msg)) => {
                // A concurrent submit with the same reference won the insert.
                warn!(client_reference = reference, "Submission insert conflicted, retrying lookup");
                match self.reuse_existing(reference, &submission.request_payload)? {
                    Some(intake) => Ok(intake),
                    None => Err(SubmissionError::Conflict(msg)),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reuse_existing(
        &self,
        reference: &str,
        payload: &Map<String, Value>,
    ) -> Result<Option<Intake>, SubmissionError> {
        if reference.is_empty() {
            return Ok(None);
        }

        let mut existing = match self.store.find_by_client_reference(reference) {
            Ok(existing) => existing,
            Err(SubmissionStoreError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if existing.status != SubmissionStatus::Failed {
            return Ok(Some(Intake::Unchanged(existing)));
        }

        info!(
            submission_id = %existing.id,
            client_reference = reference,
            previous_error = existing.error_message.as_deref().unwrap_or(""),
            "Resubmitting failed submission"
        );
        existing.reset_to_pending(payload.clone());
        self.store.save(&mut existing)?;
        Ok(Some(Intake::Enqueue(existing, "requeued")))
    }

    async fn publish(&self, submission: &Submission) -> Result<(), QueueError> {
        let payload = serde_json::to_vec(&SubmissionMessage::new(submission.id.as_str()))
            .map_err(|e| QueueError::Encode(e.to_string()))?;

        let mut headers = HashMap::new();
        headers.insert(
            SUBMITTED_AT_HEADER.to_string(),
            submission
                .created_at
                .to_rfc3339_opts(SecondsFormat::Nanos, true),
        );

        match tokio::time::timeout(
            self.publish_timeout,
            self.queue.publish(&submission.id, &payload, &headers),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(QueueError::Timeout(self.publish_timeout)),
        }
    }
}
