//! Core ticket data types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Priority assigned when a request does not carry one.
pub const DEFAULT_PRIORITY: &str = "medium";

/// Workflow status of a materialized ticket.
///
/// This is the domain status of the ticket itself and is independent of the
/// status of the submission that produced it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Awaiting processing. Initial state of every ticket.
    #[default]
    Open,
    /// Someone is working on it.
    InProgress,
    /// Work finished.
    Resolved,
    /// Abandoned.
    Cancelled,
}

impl TicketStatus {
    /// All statuses, in workflow order.
    pub const ALL: [TicketStatus; 4] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Resolved,
        TicketStatus::Cancelled,
    ];

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown ticket status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTicketStatus(pub String);

impl fmt::Display for UnknownTicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ticket status: {}", self.0)
    }
}

impl std::error::Error for UnknownTicketStatus {}

impl FromStr for TicketStatus {
    type Err = UnknownTicketStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        TicketStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or(UnknownTicketStatus(normalized))
    }
}

/// A materialized ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    /// Unique ticket identifier (UUID).
    pub id: String,
    /// Short human-readable title.
    pub title: String,
    /// Current workflow status.
    pub status: TicketStatus,
    /// Form this ticket was raised against.
    pub form_id: String,
    /// Assigned identity, if any.
    pub assignee_id: Option<String>,
    /// Free-form priority label ("low", "medium", "high", ...).
    pub priority: String,
    /// Opaque caller metadata.
    pub metadata: Map<String, Value>,
    /// When the ticket was created.
    pub created_at: DateTime<Utc>,
    /// When the ticket was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the ticket was resolved.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Fields needed to create a ticket. Identifiers and timestamps are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTicket {
    pub title: String,
    pub status: TicketStatus,
    pub form_id: String,
    pub assignee_id: Option<String>,
    pub priority: String,
    pub metadata: Map<String, Value>,
}
