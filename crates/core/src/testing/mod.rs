//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the collaborator traits the
//! submission pipeline depends on, so coordinator and worker behavior can be
//! tested without a broker or a real ticket database.
//!
//! # Example
//!
//! ```rust,ignore
//! use pflow_core::testing::{fixtures, MockQueue, MockTicketStore};
//!
//! let queue = Arc::new(MockQueue::new());
//! let tickets = Arc::new(MockTicketStore::new());
//!
//! let coordinator = SubmissionCoordinator::new(store.clone(), queue.clone());
//! coordinator.submit(fixtures::submission_request("ref-1")).await?;
//! assert_eq!(queue.publish_count(), 1);
//! ```

mod mock_queue;
mod mock_ticket_store;

pub use mock_queue::MockQueue;
pub use mock_ticket_store::MockTicketStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Map, Value};

    use crate::submission::SubmissionRequest;

    /// Form id used by the fixtures.
    pub const FORM_ID: &str = "7d3f6a2e-8f0c-4b4e-9a65-1f2d3c4b5a69";

    /// A normalized ticket payload with the given title.
    pub fn ticket_payload(title: &str) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("title".to_string(), json!(title));
        payload.insert("formId".to_string(), json!(FORM_ID));
        payload.insert("status".to_string(), json!("open"));
        payload.insert("priority".to_string(), json!("medium"));
        payload
    }

    /// A submission request carrying a valid payload.
    pub fn submission_request(client_reference: &str) -> SubmissionRequest {
        SubmissionRequest {
            client_reference: client_reference.to_string(),
            payload: ticket_payload("Printer on floor 3 is jammed"),
        }
    }

    /// A submission request whose payload the worker will reject.
    pub fn invalid_submission_request(client_reference: &str) -> SubmissionRequest {
        let mut payload = ticket_payload("Missing form");
        payload.remove("formId");
        SubmissionRequest {
            client_reference: client_reference.to_string(),
            payload,
        }
    }
}
