//! Ticket storage trait and types.

use thiserror::Error;

use crate::ticket::{NewTicket, Ticket};

/// Error type for ticket operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TicketError {
    /// Ticket not found.
    #[error("Ticket not found: {0}")]
    NotFound(String),
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Trait for ticket storage backends.
///
/// Only the operations the submission worker and the read endpoint need are
/// part of the contract; the synchronous ticket CRUD lives elsewhere.
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket and return it with its assigned id and timestamps.
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError>;

    /// Get a ticket by ID.
    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    /// Number of stored tickets.
    fn count(&self) -> Result<i64, TicketError>;
}
