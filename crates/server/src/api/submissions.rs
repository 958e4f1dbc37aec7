//! Asynchronous ticket submission handlers.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, warn};

use pflow_core::{
    ErrorKind, Submission, SubmissionError, SubmissionMetrics, SubmissionRequest,
    SubmissionStatus, TicketStatus,
};

use crate::state::AppState;

/// Minimum title length after trimming.
const MIN_TITLE_LEN: usize = 3;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a ticket.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SubmitTicketBody {
    pub title: Option<String>,
    pub status: Option<String>,
    pub form_id: Option<String>,
    pub assignee_id: Option<String>,
    pub priority: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    /// Idempotency key. Resubmitting the same key never creates a second ticket.
    pub client_reference: Option<String>,
}

/// Client view of a submission. Optional fields are omitted when unset.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionResponse {
    pub id: String,
    pub client_reference: String,
    pub status: SubmissionStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            client_reference: submission.client_reference,
            status: submission.status,
            created_at: submission.created_at.to_rfc3339(),
            updated_at: submission.updated_at.to_rfc3339(),
            ticket_id: submission.ticket_id,
            completed_at: submission.completed_at.map(|t| t.to_rfc3339()),
            error_message: submission.error_message.filter(|m| !m.is_empty()),
        }
    }
}

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn submission_error_response(err: &SubmissionError) -> ApiError {
    let status = match err.kind() {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        ErrorKind::Persistence | ErrorKind::TicketStore => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!(error = %err, kind = err.kind().as_str(), "Submission request failed");
    }
    api_error(status, err.to_string())
}

// ============================================================================
// Payload normalization
// ============================================================================

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

/// Validate a submission body and build the payload stored with the submission.
///
/// The result always carries `title`, `status`, `formId` and `priority`;
/// `assigneeId` and `metadata` only when supplied.
pub fn normalize_ticket_payload(body: &SubmitTicketBody) -> Result<Map<String, Value>, String> {
    let title = trimmed(&body.title);
    if title.chars().count() < MIN_TITLE_LEN {
        return Err(format!("title must be at least {MIN_TITLE_LEN} characters"));
    }

    let form_id = trimmed(&body.form_id);
    if uuid::Uuid::parse_str(form_id).is_err() {
        return Err("formId must be a valid UUID".to_string());
    }

    let status = match trimmed(&body.status) {
        "" => TicketStatus::default(),
        raw => TicketStatus::from_str(raw).map_err(|_| "invalid status".to_string())?,
    };

    let priority = match trimmed(&body.priority) {
        "" => pflow_core::ticket::DEFAULT_PRIORITY.to_string(),
        raw => raw.to_lowercase(),
    };

    let mut normalized = Map::new();
    normalized.insert("title".to_string(), json!(title));
    normalized.insert("status".to_string(), json!(status.as_str()));
    normalized.insert("formId".to_string(), json!(form_id));
    normalized.insert("priority".to_string(), json!(priority));

    let assignee = trimmed(&body.assignee_id);
    if !assignee.is_empty() {
        normalized.insert("assigneeId".to_string(), json!(assignee));
    }

    if let Some(metadata) = &body.metadata {
        normalized.insert("metadata".to_string(), Value::Object(metadata.clone()));
    }

    Ok(normalized)
}

// ============================================================================
// Handlers
// ============================================================================

/// Accept a ticket for asynchronous creation.
///
/// Answers 202 while the submission is outstanding and 200 once an earlier
/// submission with the same reference has completed.
pub async fn submit_ticket(
    State(state): State<Arc<AppState>>,
    body: Result<Json<SubmitTicketBody>, JsonRejection>,
) -> Result<(StatusCode, Json<DataResponse<SubmissionResponse>>), ApiError> {
    let Json(body) = body.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected submission body");
        api_error(StatusCode::BAD_REQUEST, rejection.body_text())
    })?;

    let payload =
        normalize_ticket_payload(&body).map_err(|msg| api_error(StatusCode::BAD_REQUEST, msg))?;

    let request = SubmissionRequest {
        client_reference: trimmed(&body.client_reference).to_string(),
        payload,
    };

    let submission = state
        .coordinator()
        .submit(request)
        .await
        .map_err(|e| submission_error_response(&e))?;

    let status = if submission.status == SubmissionStatus::Completed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };

    Ok((
        status,
        Json(DataResponse {
            data: SubmissionResponse::from(submission),
        }),
    ))
}

/// Get a submission by ID
pub async fn get_submission(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DataResponse<SubmissionResponse>>, ApiError> {
    match state.coordinator().lookup(&id) {
        Ok(submission) => Ok(Json(DataResponse {
            data: SubmissionResponse::from(submission),
        })),
        Err(SubmissionError::NotFound(_)) => {
            Err(api_error(StatusCode::NOT_FOUND, "submission not found"))
        }
        Err(e) => Err(submission_error_response(&e)),
    }
}

/// Backlog counts for the submission queue.
pub async fn queue_metrics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DataResponse<SubmissionMetrics>>, ApiError> {
    state
        .coordinator()
        .metrics()
        .map(|metrics| Json(DataResponse { data: metrics }))
        .map_err(|e| submission_error_response(&e))
}
