//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submission coordinator (intake outcomes, publish failures)
//! - Submission worker (handled messages, dead letters, latency)

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Coordinator Metrics
// =============================================================================

/// Submissions received by outcome.
pub static SUBMISSIONS_RECEIVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pflow_submissions_received_total",
            "Total ticket submissions received",
        ),
        &["outcome"], // "enqueued", "requeued", "duplicate", "publish_failed", "error"
    )
    .expect("valid metric definition")
});

/// Publishes that failed or timed out.
pub static PUBLISH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pflow_submission_publish_failures_total",
        "Total submission messages the queue did not accept",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Worker Metrics
// =============================================================================

/// Messages handled by the worker, by result.
pub static WORKER_MESSAGES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "pflow_worker_messages_total",
            "Total submission messages handled",
        ),
        &["result"], // "completed", "skipped", "invalid", "failed"
    )
    .expect("valid metric definition")
});

/// Deliveries given up on.
pub static DEAD_LETTERED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "pflow_worker_dead_lettered_total",
        "Total deliveries acknowledged without success",
    )
    .expect("valid metric definition")
});

/// Time spent in the message handler.
pub static HANDLE_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "pflow_worker_handle_duration_seconds",
            "Duration of submission message handling",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
    )
    .expect("valid metric definition")
});

/// Time between publish and delivery, from the `submitted_at` header.
pub static DELIVERY_LAG: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "pflow_worker_delivery_lag_seconds",
            "Delay between submission publish and worker delivery",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 60.0, 300.0, 1800.0]),
    )
    .expect("valid metric definition")
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Coordinator
        Box::new(SUBMISSIONS_RECEIVED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        // Worker
        Box::new(WORKER_MESSAGES.clone()),
        Box::new(DEAD_LETTERED.clone()),
        Box::new(HANDLE_DURATION.clone()),
        Box::new(DELIVERY_LAG.clone()),
    ]
}
