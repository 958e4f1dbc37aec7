//! Asynchronous ticket submissions.
//!
//! The coordinator records each request and publishes its id to the queue;
//! the worker consumes those messages and materializes the tickets:
//! - **Coordinator**: inline with the API call, deduplicates by client reference
//! - **Worker**: N consumer loops, at-least-once, idempotent per submission

mod coordinator;
mod error;
mod pool;
mod sqlite_store;
mod store;
mod types;
mod worker;

pub use coordinator::{save_best_effort, SubmissionCoordinator, DEFAULT_PUBLISH_TIMEOUT};
pub use error::{ErrorKind, SubmissionError};
pub use pool::{WorkerPool, WorkerPoolStatus};
pub use sqlite_store::SqliteSubmissionStore;
pub use store::{SubmissionStore, SubmissionStoreError};
pub use types::{
    Submission, SubmissionMessage, SubmissionMetrics, SubmissionRequest, SubmissionStatus,
    SUBMITTED_AT_HEADER,
};
pub use worker::SubmissionWorker;
