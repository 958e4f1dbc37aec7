//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! with real SQLite stores in a temp dir and either an in-memory queue drained
//! by a running worker pool, or a `MockQueue` with no worker at all.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use pflow_core::{
    testing::MockQueue, Config, DatabaseConfig, MemoryQueue, QueueConsumer, QueueTransport,
    SqliteSubmissionStore, SqliteTicketStore, SubmissionCoordinator, SubmissionStore,
    SubmissionWorker, TicketStore, WorkerConfig, WorkerPool,
};
use pflow_server::state::AppState;

/// Re-export fixtures for test convenience
pub use pflow_core::testing::fixtures;

/// Test fixture for API testing.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///
///     let response = fixture.post("/api/v1/tickets/submissions", json!({
///         "title": "Printer jammed",
///         "formId": fixtures::FORM_ID,
///     })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Mock queue, when the fixture was built without a worker
    pub mock_queue: Option<Arc<MockQueue>>,
    /// Worker pool draining the in-memory queue, if running
    pub worker_pool: Option<Arc<WorkerPool>>,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub text: String,
}

impl TestFixture {
    /// In-memory queue with a running worker pool (end-to-end).
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let queue = Arc::new(MemoryQueue::new(64));
        let consumer: Arc<dyn QueueConsumer> = queue.clone();

        let (router, pool) = Self::build(&temp_dir, queue, Some(consumer)).await;

        Self {
            router,
            mock_queue: None,
            worker_pool: pool,
            temp_dir,
        }
    }

    /// Mock queue and no worker: submissions stay pending.
    pub async fn with_mock_queue() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let queue = Arc::new(MockQueue::new());

        let (router, pool) = Self::build(&temp_dir, queue.clone(), None).await;

        Self {
            router,
            mock_queue: Some(queue),
            worker_pool: pool,
            temp_dir,
        }
    }

    async fn build(
        temp_dir: &TempDir,
        transport: Arc<dyn QueueTransport>,
        consumer: Option<Arc<dyn QueueConsumer>>,
    ) -> (Router, Option<Arc<WorkerPool>>) {
        let db_path = temp_dir.path().join("test.db");

        let config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            ..Default::default()
        };

        let submission_store: Arc<dyn SubmissionStore> = Arc::new(
            SqliteSubmissionStore::new(&db_path).expect("Failed to create submission store"),
        );
        let ticket_store: Arc<dyn TicketStore> =
            Arc::new(SqliteTicketStore::new(&db_path).expect("Failed to create ticket store"));

        let coordinator = Arc::new(
            SubmissionCoordinator::new(Arc::clone(&submission_store), transport)
                .with_publish_timeout(Duration::from_millis(200)),
        );

        let pool = match consumer {
            Some(consumer) => {
                let worker = Arc::new(SubmissionWorker::new(
                    Arc::clone(&submission_store),
                    Arc::clone(&ticket_store),
                ));
                let pool = Arc::new(WorkerPool::new(
                    worker,
                    consumer,
                    WorkerConfig {
                        enabled: true,
                        consumers: 1,
                        max_delivery_attempts: 3,
                    },
                ));
                pool.start().await;
                Some(pool)
            }
            None => None,
        };

        let state = Arc::new(AppState::new(
            config,
            coordinator,
            ticket_store,
            pool.clone(),
        ));

        (pflow_server::api::create_router(state), pool)
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body.to_string())).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        self.request("POST", path, Some(body.to_string())).await
    }

    /// Poll a submission until it reaches `status` or the deadline passes.
    pub async fn wait_for_submission_status(&self, id: &str, status: &str) -> TestResponse {
        let path = format!("/api/v1/tickets/submissions/{}", id);
        let mut response = self.get(&path).await;
        for _ in 0..100 {
            if response.body["data"]["status"] == status {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            response = self.get(&path).await;
        }
        response
    }

    async fn request(&self, method: &str, path: &str, body: Option<String>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(body) => {
                request_builder = request_builder.header("Content-Type", "application/json");
                Body::from(body)
            }
            None => Body::empty(),
        };

        let request = request_builder.body(body).expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let text = String::from_utf8_lossy(&body_bytes).into_owned();
        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body, text }
    }

    /// Stop the worker pool, if any.
    pub async fn shutdown(&self) {
        if let Some(ref pool) = self.worker_pool {
            pool.stop().await;
        }
    }
}
