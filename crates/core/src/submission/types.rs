//! Submission data model and state transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::SubmissionError;
use crate::ticket::{NewTicket, TicketStatus, DEFAULT_PRIORITY};

/// Header carrying the time a submission was published.
pub const SUBMITTED_AT_HEADER: &str = "submitted_at";

/// Processing status of a submission.
///
/// `pending -> processing -> completed`, `processing -> failed`,
/// `failed -> pending` on resubmission. `completed` is terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SubmissionStatus {
    pub const ALL: [SubmissionStatus; 4] = [
        SubmissionStatus::Pending,
        SubmissionStatus::Processing,
        SubmissionStatus::Completed,
        SubmissionStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Completed => "completed",
            SubmissionStatus::Failed => "failed",
        }
    }

    /// Work is queued or in flight.
    pub fn is_outstanding(&self) -> bool {
        matches!(self, SubmissionStatus::Pending | SubmissionStatus::Processing)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubmissionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubmissionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown submission status: {s}"))
    }
}

/// A request to create a ticket asynchronously.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubmissionRequest {
    /// Caller-supplied idempotency key. Blank means "not provided".
    pub client_reference: String,
    /// Normalized ticket fields (`title`, `formId`, `status`, `assigneeId`, `priority`, `metadata`).
    pub payload: Map<String, Value>,
}

/// A recorded submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: String,
    pub client_reference: String,
    pub status: SubmissionStatus,
    /// Last failure. Cleared on any transition away from `failed`.
    pub error_message: Option<String>,
    /// Set exactly when `status` is `completed`.
    pub ticket_id: Option<String>,
    /// Ticket fields captured at submission time.
    pub request_payload: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// Build a new pending submission. A blank reference falls back to the generated id.
    pub fn new(client_reference: &str, payload: Map<String, Value>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let client_reference = match client_reference.trim() {
            "" => id.clone(),
            reference => reference.to_string(),
        };
        let now = Utc::now();

        Self {
            id,
            client_reference,
            status: SubmissionStatus::Pending,
            error_message: None,
            ticket_id: None,
            request_payload: payload,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Put a failed submission back in the queue with a fresh payload.
    pub fn reset_to_pending(&mut self, payload: Map<String, Value>) {
        self.status = SubmissionStatus::Pending;
        self.error_message = None;
        self.ticket_id = None;
        self.completed_at = None;
        self.request_payload = payload;
    }

    pub fn mark_processing(&mut self) {
        self.status = SubmissionStatus::Processing;
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = SubmissionStatus::Failed;
        self.error_message = Some(message.into());
        self.ticket_id = None;
        self.completed_at = None;
    }

    pub fn mark_completed(&mut self, ticket_id: impl Into<String>) {
        self.status = SubmissionStatus::Completed;
        self.error_message = None;
        self.ticket_id = Some(ticket_id.into());
        self.completed_at = Some(Utc::now());
    }

    /// Rebuild the ticket to create from the stored payload.
    ///
    /// `title` and `formId` are required; `status` defaults to `open` and
    /// `priority` to `medium`.
    pub fn to_new_ticket(&self) -> Result<NewTicket, SubmissionError> {
        let payload = &self.request_payload;

        let title = payload_str(payload, "title");
        if title.is_empty() {
            return Err(SubmissionError::Validation(
                "ticket submission missing title".to_string(),
            ));
        }

        let form_id = payload_str(payload, "formId");
        if form_id.is_empty() {
            return Err(SubmissionError::Validation(
                "ticket submission missing formId".to_string(),
            ));
        }

        let status = match payload_str(payload, "status") {
            "" => TicketStatus::default(),
            value => value
                .parse::<TicketStatus>()
                .map_err(|e| SubmissionError::Validation(e.to_string()))?,
        };

        let priority = match payload_str(payload, "priority") {
            "" => DEFAULT_PRIORITY.to_string(),
            value => value.to_string(),
        };

        let assignee_id = match payload_str(payload, "assigneeId") {
            "" => None,
            value => Some(value.to_string()),
        };

        let metadata = match payload.get("metadata") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        Ok(NewTicket {
            title: title.to_string(),
            status,
            form_id: form_id.to_string(),
            assignee_id,
            priority,
            metadata,
        })
    }
}

fn payload_str<'a>(payload: &'a Map<String, Value>, key: &str) -> &'a str {
    payload.get(key).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

/// Body of a queue message announcing a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMessage {
    #[serde(default)]
    pub submission_id: String,
}

impl SubmissionMessage {
    pub fn new(submission_id: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
        }
    }

    /// Decode a message body, rejecting malformed JSON and blank ids.
    pub fn decode(bytes: &[u8]) -> Result<Self, SubmissionError> {
        let message: SubmissionMessage = serde_json::from_slice(bytes)
            .map_err(|e| SubmissionError::Validation(format!("decode submission message: {e}")))?;

        let submission_id = message.submission_id.trim();
        if submission_id.is_empty() {
            return Err(SubmissionError::Validation(
                "submission id missing from message".to_string(),
            ));
        }

        Ok(Self::new(submission_id))
    }
}

/// Aggregate queue health, as exposed by the queue-metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetrics {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    /// Whole seconds since the oldest pending/processing submission was created.
    pub oldest_pending_seconds: i64,
}

impl SubmissionMetrics {
    pub fn count(&self, status: SubmissionStatus) -> i64 {
        match status {
            SubmissionStatus::Pending => self.pending,
            SubmissionStatus::Processing => self.processing,
            SubmissionStatus::Completed => self.completed,
            SubmissionStatus::Failed => self.failed,
        }
    }
}
