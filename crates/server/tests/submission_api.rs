//! HTTP tests for the submission API.
//!
//! Requests go through the full router (`oneshot`) backed by SQLite stores in a
//! temp dir. End-to-end tests run a real worker pool on the in-memory queue.

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::{fixtures, TestFixture};
use pflow_core::{QueueError, SubmissionMessage};

const SUBMISSIONS: &str = "/api/v1/tickets/submissions";

fn ticket_body(title: &str) -> serde_json::Value {
    json!({
        "title": title,
        "formId": fixtures::FORM_ID,
    })
}

// ============================================================================
// Basic endpoints
// ============================================================================

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::with_mock_queue().await;

    let response = fixture.get("/api/v1/health").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::with_mock_queue().await;

    let response = fixture.get("/api/v1/config").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["queue"]["backend"], "memory");
    assert_eq!(response.body["server"]["port"], 8083);
    assert_eq!(response.body["worker"]["max_delivery_attempts"], 5);
    assert!(response.body["queue"].get("kafka").is_none());
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;

    fixture.get("/api/v1/health").await;
    let response = fixture.get("/metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.text.contains("pflow_http_requests_total"));
    assert!(response.text.contains("pflow_submissions_by_status"));
    assert!(response.text.contains("pflow_worker_pool_running 1"));

    fixture.shutdown().await;
}

// ============================================================================
// Submissions
// ============================================================================

#[tokio::test]
async fn test_submission_is_materialized_end_to_end() {
    let fixture = TestFixture::new().await;

    let response = fixture
        .post(
            SUBMISSIONS,
            json!({
                "title": "  Broken chair in room 12  ",
                "formId": fixtures::FORM_ID,
                "priority": "HIGH",
                "assigneeId": "agent-7",
                "metadata": {"room": 12},
                "clientReference": "req-e2e-1"
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.body["data"]["clientReference"], "req-e2e-1");
    let id = response.body["data"]["id"].as_str().unwrap().to_string();

    let response = fixture.wait_for_submission_status(&id, "completed").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "completed");
    assert!(response.body["data"]["completedAt"].is_string());
    assert!(response.body["data"].get("errorMessage").is_none());
    let ticket_id = response.body["data"]["ticketId"].as_str().unwrap().to_string();

    let ticket = fixture.get(&format!("/api/v1/tickets/{}", ticket_id)).await;
    assert_eq!(ticket.status, StatusCode::OK);
    assert_eq!(ticket.body["data"]["title"], "Broken chair in room 12");
    assert_eq!(ticket.body["data"]["formId"], fixtures::FORM_ID);
    assert_eq!(ticket.body["data"]["status"], "open");
    assert_eq!(ticket.body["data"]["priority"], "high");
    assert_eq!(ticket.body["data"]["assigneeId"], "agent-7");
    assert_eq!(ticket.body["data"]["metadata"], json!({"room": 12}));

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_resubmitting_completed_reference_returns_ok() {
    let fixture = TestFixture::new().await;

    let mut body = ticket_body("Monitor flickers");
    body["clientReference"] = json!("req-done");

    let first = fixture.post(SUBMISSIONS, body.clone()).await;
    assert_eq!(first.status, StatusCode::ACCEPTED);
    let id = first.body["data"]["id"].as_str().unwrap().to_string();
    let completed = fixture.wait_for_submission_status(&id, "completed").await;
    assert_eq!(completed.body["data"]["status"], "completed");

    let second = fixture.post(SUBMISSIONS, body).await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["data"]["id"], id.as_str());
    assert_eq!(second.body["data"]["ticketId"], completed.body["data"]["ticketId"]);

    fixture.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_pending_submission_is_not_republished() {
    let fixture = TestFixture::with_mock_queue().await;
    let queue = fixture.mock_queue.as_ref().unwrap();

    let mut body = ticket_body("Coffee machine leaking");
    body["clientReference"] = json!("req-dup");

    let first = fixture.post(SUBMISSIONS, body.clone()).await;
    let second = fixture.post(SUBMISSIONS, body).await;

    assert_eq!(first.status, StatusCode::ACCEPTED);
    assert_eq!(second.status, StatusCode::ACCEPTED);
    assert_eq!(first.body["data"]["id"], second.body["data"]["id"]);
    assert_eq!(second.body["data"]["status"], "pending");
    assert_eq!(queue.publish_count(), 1);

    let published = queue.published();
    let message = SubmissionMessage::decode(&published[0].value).unwrap();
    assert_eq!(first.body["data"]["id"], message.submission_id.as_str());
}

#[tokio::test]
async fn test_blank_reference_defaults_to_submission_id() {
    let fixture = TestFixture::with_mock_queue().await;

    let mut body = ticket_body("Door badge not working");
    body["clientReference"] = json!("   ");

    let response = fixture.post(SUBMISSIONS, body).await;
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(
        response.body["data"]["clientReference"],
        response.body["data"]["id"]
    );
}

#[tokio::test]
async fn test_publish_failure_returns_bad_gateway() {
    let fixture = TestFixture::with_mock_queue().await;
    let queue = fixture.mock_queue.as_ref().unwrap();
    queue.fail_next_publish(QueueError::Publish("broker down".to_string()));

    let mut body = ticket_body("Projector bulb blown");
    body["clientReference"] = json!("req-fail");

    let response = fixture.post(SUBMISSIONS, body.clone()).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .contains("broker down"));

    // The failed entry is retried on the next submission with the same reference
    let retry = fixture.post(SUBMISSIONS, body).await;
    assert_eq!(retry.status, StatusCode::ACCEPTED);
    assert_eq!(retry.body["data"]["status"], "pending");
    assert!(retry.body["data"].get("errorMessage").is_none());
    assert_eq!(queue.publish_count(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_counted_as_failed() {
    let fixture = TestFixture::with_mock_queue().await;
    let queue = fixture.mock_queue.as_ref().unwrap();
    queue.fail_next_publish(QueueError::Closed);

    let mut body = ticket_body("Sink clogged");
    body["clientReference"] = json!("req-closed");
    let response = fixture.post(SUBMISSIONS, body).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    let metrics = fixture.get("/api/v1/tickets/queue-metrics").await;
    assert_eq!(metrics.body["data"]["failed"], 1);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_submission_validation_errors() {
    let fixture = TestFixture::with_mock_queue().await;

    let cases = [
        (ticket_body("ab"), "title must be at least 3 characters"),
        (
            json!({"title": "Valid title", "formId": "not-a-uuid"}),
            "formId must be a valid UUID",
        ),
        (
            json!({"title": "Valid title", "formId": fixtures::FORM_ID, "status": "archived"}),
            "invalid status",
        ),
    ];

    for (body, message) in cases {
        let response = fixture.post(SUBMISSIONS, body).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body["error"], message);
    }

    assert_eq!(fixture.mock_queue.as_ref().unwrap().publish_count(), 0);
}

#[tokio::test]
async fn test_submission_rejects_unknown_fields_and_bad_json() {
    let fixture = TestFixture::with_mock_queue().await;

    let mut body = ticket_body("Valid title");
    body["unexpected"] = json!(true);
    let response = fixture.post(SUBMISSIONS, body).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());

    let response = fixture.post_raw(SUBMISSIONS, "{not json").await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

// ============================================================================
// Lookups
// ============================================================================

#[tokio::test]
async fn test_unknown_submission_is_not_found() {
    let fixture = TestFixture::with_mock_queue().await;

    let response = fixture
        .get("/api/v1/tickets/submissions/550e8400-e29b-41d4-a716-446655440000")
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "submission not found");
}

#[tokio::test]
async fn test_unknown_ticket_is_not_found() {
    let fixture = TestFixture::with_mock_queue().await;

    let response = fixture.get("/api/v1/tickets/does-not-exist").await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["error"], "ticket not found");
}

#[tokio::test]
async fn test_queue_metrics_count_outstanding_submissions() {
    let fixture = TestFixture::with_mock_queue().await;

    let empty = fixture.get("/api/v1/tickets/queue-metrics").await;
    assert_eq!(empty.status, StatusCode::OK);
    assert_eq!(
        empty.body["data"],
        json!({
            "pending": 0,
            "processing": 0,
            "completed": 0,
            "failed": 0,
            "oldestPendingSeconds": 0
        })
    );

    fixture.post(SUBMISSIONS, ticket_body("First issue")).await;
    fixture.post(SUBMISSIONS, ticket_body("Second issue")).await;

    let response = fixture.get("/api/v1/tickets/queue-metrics").await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["pending"], 2);
    assert_eq!(response.body["data"]["completed"], 0);
    assert!(response.body["data"]["oldestPendingSeconds"].as_i64().unwrap() >= 0);
}
