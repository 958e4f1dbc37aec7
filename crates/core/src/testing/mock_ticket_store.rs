//! Mock ticket store for testing.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use crate::ticket::{NewTicket, Ticket, TicketError, TicketStore};

/// In-memory ticket store with failure injection.
///
/// # Example
///
/// ```rust,ignore
/// use pflow_core::testing::MockTicketStore;
///
/// let tickets = MockTicketStore::new();
/// tickets.fail_next_create(TicketError::Database("locked".into()));
///
/// // ... run the worker ...
///
/// assert_eq!(tickets.created().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockTicketStore {
    tickets: Mutex<Vec<Ticket>>,
    /// If set, the next create fails with this error.
    next_error: Mutex<Option<TicketError>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTicketStore {
    /// Create a new, empty mock ticket store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tickets created so far, in creation order.
    pub fn created(&self) -> Vec<Ticket> {
        lock(&self.tickets).clone()
    }

    /// Configure the next create to fail with the given error.
    pub fn fail_next_create(&self, error: TicketError) {
        *lock(&self.next_error) = Some(error);
    }
}

impl TicketStore for MockTicketStore {
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        if let Some(error) = lock(&self.next_error).take() {
            return Err(error);
        }

        let now = Utc::now();
        let ticket = Ticket {
            id: uuid::Uuid::new_v4().to_string(),
            title: ticket.title,
            status: ticket.status,
            form_id: ticket.form_id,
            assignee_id: ticket.assignee_id,
            priority: ticket.priority,
            metadata: ticket.metadata,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        };
        lock(&self.tickets).push(ticket.clone());
        Ok(ticket)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        Ok(lock(&self.tickets).iter().find(|t| t.id == id).cloned())
    }

    fn count(&self) -> Result<i64, TicketError> {
        Ok(lock(&self.tickets).len() as i64)
    }
}
