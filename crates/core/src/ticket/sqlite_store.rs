//! SQLite-backed ticket store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::{Map, Value};

use super::{NewTicket, Ticket, TicketError, TicketStatus, TicketStore};

const SELECT_COLUMNS: &str = "SELECT id, title, status, form_id, assignee_id, priority, metadata, created_at, updated_at, resolved_at FROM tickets";

/// SQLite-backed ticket store.
pub struct SqliteTicketStore {
    conn: Mutex<Connection>,
}

impl SqliteTicketStore {
    /// Create a new SQLite ticket store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TicketError> {
        let conn = Connection::open(path).map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite ticket store (useful for testing).
    pub fn in_memory() -> Result<Self, TicketError> {
        let conn =
            Connection::open_in_memory().map_err(|e| TicketError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TicketError> {
        conn.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS tickets (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL,
                form_id TEXT NOT NULL,
                assignee_id TEXT,
                priority TEXT NOT NULL DEFAULT 'medium',
                metadata TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                resolved_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
            CREATE INDEX IF NOT EXISTS idx_tickets_form_id ON tickets(form_id);
            CREATE INDEX IF NOT EXISTS idx_tickets_assignee_id ON tickets(assignee_id);
            "#,
        )
        .map_err(|e| TicketError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TicketError> {
        self.conn
            .lock()
            .map_err(|_| TicketError::Database("ticket store lock poisoned".to_string()))
    }

    fn row_to_ticket(row: &rusqlite::Row) -> rusqlite::Result<Ticket> {
        let status_str: String = row.get(2)?;
        let metadata_json: String = row.get(6)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;
        let resolved_at_str: Option<String> = row.get(9)?;

        let status = status_str.parse().unwrap_or(TicketStatus::Open);
        let metadata: Map<String, Value> =
            serde_json::from_str(&metadata_json).unwrap_or_default();

        Ok(Ticket {
            id: row.get(0)?,
            title: row.get(1)?,
            status,
            form_id: row.get(3)?,
            assignee_id: row.get(4)?,
            priority: row.get(5)?,
            metadata,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            resolved_at: resolved_at_str.as_deref().map(parse_timestamp),
        })
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl TicketStore for SqliteTicketStore {
    fn create(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        let conn = self.lock()?;

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let metadata_json =
            serde_json::to_string(&ticket.metadata).map_err(|e| TicketError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO tickets (id, title, status, form_id, assignee_id, priority, metadata, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                id,
                ticket.title,
                ticket.status.as_str(),
                ticket.form_id,
                ticket.assignee_id,
                ticket.priority,
                metadata_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| TicketError::Database(e.to_string()))?;

        Ok(Ticket {
            id,
            title: ticket.title,
            status: ticket.status,
            form_id: ticket.form_id,
            assignee_id: ticket.assignee_id,
            priority: ticket.priority,
            metadata: ticket.metadata,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        })
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        let conn = self.lock()?;

        let result = conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?"),
            params![id],
            Self::row_to_ticket,
        );

        match result {
            Ok(ticket) => Ok(Some(ticket)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TicketError::Database(e.to_string())),
        }
    }

    fn count(&self) -> Result<i64, TicketError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM tickets", [], |row| row.get(0))
            .map_err(|e| TicketError::Database(e.to_string()))
    }
}
