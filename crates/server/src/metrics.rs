//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the ticket submission server:
//! - HTTP request metrics (latency, counts, in flight)
//! - Submission backlog by status (collected dynamically)
//! - Worker pool status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};
use regex_lite::Regex;
use tracing::error;

use pflow_core::SubmissionStatus;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "pflow_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .expect("valid metric definition")
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("pflow_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .expect("valid metric definition")
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pflow_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Submission Metrics (collected dynamically)
// =============================================================================

/// Submissions by current status.
pub static SUBMISSIONS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "pflow_submissions_by_status",
            "Current submission count by status",
        ),
        &["status"],
    )
    .expect("valid metric definition")
});

/// Age of the oldest outstanding submission.
pub static OLDEST_PENDING_SECONDS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pflow_submission_oldest_pending_seconds",
        "Age in seconds of the oldest pending or processing submission",
    )
    .expect("valid metric definition")
});

/// Worker pool running state (1 = running, 0 = stopped).
pub static WORKER_POOL_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "pflow_worker_pool_running",
        "Whether the submission worker pool is running (1) or stopped (0)",
    )
    .expect("valid metric definition")
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    let server_metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // HTTP
        Box::new(HTTP_REQUEST_DURATION.clone()),
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()),
        // Submissions
        Box::new(SUBMISSIONS_BY_STATUS.clone()),
        Box::new(OLDEST_PENDING_SECONDS.clone()),
        Box::new(WORKER_POOL_RUNNING.clone()),
    ];

    // Core metrics (coordinator, worker)
    for metric in server_metrics
        .into_iter()
        .chain(pflow_core::metrics::all_metrics())
    {
        if let Err(e) = registry.register(metric) {
            error!(error = %e, "Failed to register metric");
        }
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the backlog gauges reflect the store at scrape time.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    if let Some(pool) = state.worker_pool() {
        WORKER_POOL_RUNNING.set(if pool.status().running { 1 } else { 0 });
    }

    match state.coordinator().metrics() {
        Ok(metrics) => {
            for status in SubmissionStatus::ALL {
                SUBMISSIONS_BY_STATUS
                    .with_label_values(&[status.as_str()])
                    .set(metrics.count(status));
            }
            OLDEST_PENDING_SECONDS.set(metrics.oldest_pending_seconds);
        }
        Err(e) => error!(error = %e, "Failed to collect submission metrics"),
    }
}

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .expect("valid regex")
});

static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/\d+(/|$)").expect("valid regex"));

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = NUMERIC_RE.replace_all(&result, "/{id}$1");
    result.to_string()
}
