//! Submission error types.

use thiserror::Error;

use crate::queue::QueueError;
use crate::ticket::TicketError;

/// Broad category of a [`SubmissionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Transport,
    Persistence,
    TicketStore,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Transport => "transport",
            ErrorKind::Persistence => "persistence",
            ErrorKind::TicketStore => "ticket_store",
        }
    }
}

/// Errors returned by the coordinator and the worker.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// Input or stored payload is malformed. Retrying cannot help.
    #[error("{0}")]
    Validation(String),

    #[error("submission not found: {0}")]
    NotFound(String),

    /// Another submission holds the same client reference.
    #[error("submission conflict: {0}")]
    Conflict(String),

    /// The queue did not accept the message.
    #[error("queue publish failed: {0}")]
    Transport(#[from] QueueError),

    #[error("submission store error: {0}")]
    Persistence(String),

    #[error("ticket store error: {0}")]
    TicketStore(#[from] TicketError),

    /// The ticket exists but the submission could not be marked completed.
    /// Redelivery would create a second ticket.
    #[error("ticket {ticket_id} created but submission not marked completed: {reason}")]
    CompletionNotRecorded { ticket_id: String, reason: String },
}

impl SubmissionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubmissionError::Validation(_) => ErrorKind::Validation,
            SubmissionError::NotFound(_) => ErrorKind::NotFound,
            SubmissionError::Conflict(_) => ErrorKind::Conflict,
            SubmissionError::Transport(_) => ErrorKind::Transport,
            SubmissionError::Persistence(_) | SubmissionError::CompletionNotRecorded { .. } => {
                ErrorKind::Persistence
            }
            SubmissionError::TicketStore(_) => ErrorKind::TicketStore,
        }
    }

    /// Redelivering the same message cannot succeed, or would materialize
    /// a ticket twice.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SubmissionError::Validation(_) | SubmissionError::CompletionNotRecorded { .. }
        )
    }
}
