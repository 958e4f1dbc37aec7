//! Submission storage trait and types.

use thiserror::Error;

use super::{Submission, SubmissionError, SubmissionMetrics};

/// Error type for submission store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionStoreError {
    /// No submission matches the lookup.
    #[error("Submission not found: {0}")]
    NotFound(String),
    /// A uniqueness constraint (id or client reference) was violated.
    #[error("Submission conflict: {0}")]
    Conflict(String),
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl From<SubmissionStoreError> for SubmissionError {
    fn from(err: SubmissionStoreError) -> Self {
        match err {
            SubmissionStoreError::NotFound(id) => SubmissionError::NotFound(id),
            SubmissionStoreError::Conflict(msg) => SubmissionError::Conflict(msg),
            SubmissionStoreError::Database(msg) => SubmissionError::Persistence(msg),
        }
    }
}

/// Trait for submission storage backends.
pub trait SubmissionStore: Send + Sync {
    /// Insert a new submission.
    fn create(&self, submission: &Submission) -> Result<(), SubmissionStoreError>;

    /// Overwrite the mutable fields of an existing submission and bump `updated_at`.
    fn save(&self, submission: &mut Submission) -> Result<(), SubmissionStoreError>;

    /// Get a submission by id.
    fn find_by_id(&self, id: &str) -> Result<Submission, SubmissionStoreError>;

    /// Get a submission by its client reference. Blank references are never found.
    fn find_by_client_reference(&self, reference: &str)
        -> Result<Submission, SubmissionStoreError>;

    /// Counts per status and the age of the oldest outstanding submission.
    fn metrics(&self) -> Result<SubmissionMetrics, SubmissionStoreError>;
}
