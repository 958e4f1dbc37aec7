//! Materialized tickets produced by the submission worker.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTicketStore;
pub use store::{TicketError, TicketStore};
pub use types::{NewTicket, Ticket, TicketStatus, UnknownTicketStatus, DEFAULT_PRIORITY};
