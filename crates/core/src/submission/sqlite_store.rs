//! SQLite-backed submission store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde_json::{Map, Value};

use super::{Submission, SubmissionMetrics, SubmissionStatus, SubmissionStore, SubmissionStoreError};

const SELECT_COLUMNS: &str = "SELECT id, client_reference, status, error_message, ticket_id, request_payload, created_at, updated_at, completed_at FROM ticket_submissions";

/// SQLite-backed submission store.
pub struct SqliteSubmissionStore {
    conn: Mutex<Connection>,
}

impl SqliteSubmissionStore {
    /// Create a new SQLite submission store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, SubmissionStoreError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite submission store (useful for testing).
    pub fn in_memory() -> Result<Self, SubmissionStoreError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), SubmissionStoreError> {
        conn.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS ticket_submissions (
                id TEXT PRIMARY KEY,
                client_reference TEXT NOT NULL UNIQUE,
                status TEXT NOT NULL,
                error_message TEXT,
                ticket_id TEXT,
                request_payload TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_ticket_submissions_status ON ticket_submissions(status);
            CREATE INDEX IF NOT EXISTS idx_ticket_submissions_created_at ON ticket_submissions(created_at);
            CREATE INDEX IF NOT EXISTS idx_ticket_submissions_ticket_id ON ticket_submissions(ticket_id);
            "#,
        )
        .map_err(db_error)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SubmissionStoreError> {
        self.conn.lock().map_err(|_| {
            SubmissionStoreError::Database("submission store lock poisoned".to_string())
        })
    }

    fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
        let status_str: String = row.get(2)?;
        let payload_json: String = row.get(5)?;
        let created_at_str: String = row.get(6)?;
        let updated_at_str: String = row.get(7)?;
        let completed_at_str: Option<String> = row.get(8)?;

        let status = status_str.parse::<SubmissionStatus>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                e.into(),
            )
        })?;
        let request_payload: Map<String, Value> =
            serde_json::from_str(&payload_json).unwrap_or_default();

        Ok(Submission {
            id: row.get(0)?,
            client_reference: row.get(1)?,
            status,
            error_message: row.get(3)?,
            ticket_id: row.get(4)?,
            request_payload,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }
}

fn db_error(e: rusqlite::Error) -> SubmissionStoreError {
    SubmissionStoreError::Database(e.to_string())
}

/// Map a write error, surfacing uniqueness violations as conflicts.
fn write_error(e: rusqlite::Error) -> SubmissionStoreError {
    match e {
        rusqlite::Error::SqliteFailure(ref failure, _)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            SubmissionStoreError::Conflict(e.to_string())
        }
        other => db_error(other),
    }
}

/// Fixed-width UTC timestamps so that text ordering matches time ordering.
fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

impl SubmissionStore for SqliteSubmissionStore {
    fn create(&self, submission: &Submission) -> Result<(), SubmissionStoreError> {
        let conn = self.lock()?;
        let payload_json = serde_json::to_string(&submission.request_payload)
            .map_err(|e| SubmissionStoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO ticket_submissions (id, client_reference, status, error_message, ticket_id, request_payload, created_at, updated_at, completed_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                submission.id,
                submission.client_reference,
                submission.status.as_str(),
                submission.error_message,
                submission.ticket_id,
                payload_json,
                format_timestamp(&submission.created_at),
                format_timestamp(&submission.updated_at),
                submission.completed_at.as_ref().map(format_timestamp),
            ],
        )
        .map_err(write_error)?;

        Ok(())
    }

    fn save(&self, submission: &mut Submission) -> Result<(), SubmissionStoreError> {
        let conn = self.lock()?;
        let payload_json = serde_json::to_string(&submission.request_payload)
            .map_err(|e| SubmissionStoreError::Database(e.to_string()))?;
        let now = Utc::now().max(submission.updated_at);

        let rows = conn
            .execute(
                "UPDATE ticket_submissions SET status = ?, error_message = ?, ticket_id = ?, request_payload = ?, updated_at = ?, completed_at = ? WHERE id = ?",
                params![
                    submission.status.as_str(),
                    submission.error_message,
                    submission.ticket_id,
                    payload_json,
                    format_timestamp(&now),
                    submission.completed_at.as_ref().map(format_timestamp),
                    submission.id,
                ],
            )
            .map_err(write_error)?;

        if rows == 0 {
            return Err(SubmissionStoreError::NotFound(submission.id.clone()));
        }

        submission.updated_at = now;
        Ok(())
    }

    fn find_by_id(&self, id: &str) -> Result<Submission, SubmissionStoreError> {
        let conn = self.lock()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE id = ?"),
            params![id],
            Self::row_to_submission,
        )
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SubmissionStoreError::NotFound(id.to_string()))
    }

    fn find_by_client_reference(
        &self,
        reference: &str,
    ) -> Result<Submission, SubmissionStoreError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(SubmissionStoreError::NotFound(String::new()));
        }

        let conn = self.lock()?;
        conn.query_row(
            &format!("{SELECT_COLUMNS} WHERE client_reference = ?"),
            params![reference],
            Self::row_to_submission,
        )
        .optional()
        .map_err(db_error)?
        .ok_or_else(|| SubmissionStoreError::NotFound(reference.to_string()))
    }

    fn metrics(&self) -> Result<SubmissionMetrics, SubmissionStoreError> {
        let conn = self.lock()?;
        let mut metrics = SubmissionMetrics::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM ticket_submissions GROUP BY status")
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(db_error)?;

        for row in rows {
            let (status, count) = row.map_err(db_error)?;
            match status.parse::<SubmissionStatus>() {
                Ok(SubmissionStatus::Pending) => metrics.pending = count,
                Ok(SubmissionStatus::Processing) => metrics.processing = count,
                Ok(SubmissionStatus::Completed) => metrics.completed = count,
                Ok(SubmissionStatus::Failed) => metrics.failed = count,
                Err(_) => tracing::warn!(status = %status, "Ignoring unknown submission status"),
            }
        }

        let oldest: Option<String> = conn
            .query_row(
                "SELECT created_at FROM ticket_submissions WHERE status IN ('pending', 'processing') ORDER BY created_at ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;

        if let Some(oldest) = oldest {
            let age = Utc::now() - parse_timestamp(&oldest);
            metrics.oldest_pending_seconds = age.num_seconds().max(0);
        }

        Ok(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn create_test_store() -> SqliteSubmissionStore {
        SqliteSubmissionStore::in_memory().expect("Failed to create in-memory store")
    }

    fn create_test_submission(reference: &str) -> Submission {
        let payload = match json!({"title": "Printer jam", "formId": "form-1"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        Submission::new(reference, payload)
    }

    #[test]
    fn test_create_and_find_by_id() {
        let store = create_test_store();
        let submission = create_test_submission("ref-1");
        store.create(&submission).unwrap();

        let found = store.find_by_id(&submission.id).unwrap();
        assert_eq!(found.id, submission.id);
        assert_eq!(found.client_reference, "ref-1");
        assert_eq!(found.status, SubmissionStatus::Pending);
        assert_eq!(found.request_payload["title"], "Printer jam");
        assert_eq!(found.created_at, submission.created_at);
    }

    #[test]
    fn test_find_by_id_missing() {
        let store = create_test_store();
        assert!(matches!(
            store.find_by_id("nope"),
            Err(SubmissionStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_find_by_client_reference() {
        let store = create_test_store();
        let submission = create_test_submission("order-42");
        store.create(&submission).unwrap();

        let found = store.find_by_client_reference(" order-42 ").unwrap();
        assert_eq!(found.id, submission.id);

        assert!(matches!(
            store.find_by_client_reference("order-43"),
            Err(SubmissionStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_blank_client_reference_is_not_found() {
        let store = create_test_store();
        assert!(matches!(
            store.find_by_client_reference("   "),
            Err(SubmissionStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_duplicate_client_reference_conflicts() {
        let store = create_test_store();
        store.create(&create_test_submission("dup")).unwrap();

        let result = store.create(&create_test_submission("dup"));
        assert!(matches!(result, Err(SubmissionStoreError::Conflict(_))));
    }

    #[test]
    fn test_save_overwrites_mutable_fields() {
        let store = create_test_store();
        let mut submission = create_test_submission("ref-save");
        store.create(&submission).unwrap();
        let created_updated_at = submission.updated_at;

        submission.mark_processing();
        submission.mark_completed("ticket-9");
        store.save(&mut submission).unwrap();
        assert!(submission.updated_at >= created_updated_at);

        let found = store.find_by_id(&submission.id).unwrap();
        assert_eq!(found.status, SubmissionStatus::Completed);
        assert_eq!(found.ticket_id.as_deref(), Some("ticket-9"));
        assert!(found.completed_at.is_some());
        assert!(found.error_message.is_none());
        assert_eq!(found.updated_at, submission.updated_at);
    }

    #[test]
    fn test_save_unknown_submission() {
        let store = create_test_store();
        let mut submission = create_test_submission("never-created");
        assert!(matches!(
            store.save(&mut submission),
            Err(SubmissionStoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_metrics_empty() {
        let store = create_test_store();
        assert_eq!(store.metrics().unwrap(), SubmissionMetrics::default());
    }

    #[test]
    fn test_metrics_counts_and_oldest_pending() {
        let store = create_test_store();

        let mut old = create_test_submission("old");
        old.created_at = Utc::now() - Duration::seconds(90);
        store.create(&old).unwrap();

        store.create(&create_test_submission("fresh")).unwrap();

        let mut processing = create_test_submission("processing");
        processing.mark_processing();
        store.create(&processing).unwrap();

        let mut done = create_test_submission("done");
        done.created_at = Utc::now() - Duration::seconds(3600);
        done.mark_completed("ticket-1");
        store.create(&done).unwrap();

        let mut failed = create_test_submission("failed");
        failed.mark_failed("boom");
        store.create(&failed).unwrap();

        let metrics = store.metrics().unwrap();
        assert_eq!(metrics.pending, 2);
        assert_eq!(metrics.processing, 1);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.failed, 1);
        // The completed row is older but does not count towards queue age.
        assert!(metrics.oldest_pending_seconds >= 90);
        assert!(metrics.oldest_pending_seconds < 3600);
    }

    #[test]
    fn test_metrics_zero_age_without_outstanding_work() {
        let store = create_test_store();
        let mut done = create_test_submission("done");
        done.created_at = Utc::now() - Duration::seconds(600);
        done.mark_completed("ticket-1");
        store.create(&done).unwrap();

        let metrics = store.metrics().unwrap();
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.oldest_pending_seconds, 0);
    }

    #[test]
    fn test_metrics_future_timestamp_is_zero() {
        let store = create_test_store();
        let mut skewed = create_test_submission("skewed");
        skewed.created_at = Utc::now() + Duration::seconds(300);
        store.create(&skewed).unwrap();

        assert_eq!(store.metrics().unwrap().oldest_pending_seconds, 0);
    }

    #[test]
    fn test_file_based_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("submissions.db");

        let submission = create_test_submission("persisted");
        {
            let store = SqliteSubmissionStore::new(&db_path).unwrap();
            store.create(&submission).unwrap();
        }

        let store = SqliteSubmissionStore::new(&db_path).unwrap();
        let found = store.find_by_client_reference("persisted").unwrap();
        assert_eq!(found.id, submission.id);
    }
}
