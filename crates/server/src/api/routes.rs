use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, middleware::metrics_middleware, submissions, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Submissions
        .route("/tickets/submissions", post(submissions::submit_ticket))
        .route("/tickets/submissions/{id}", get(submissions::get_submission))
        .route("/tickets/queue-metrics", get(submissions::queue_metrics))
        // Tickets
        .route("/tickets/{id}", get(tickets::get_ticket))
        .with_state(Arc::clone(&state));

    Router::new()
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .nest("/api/v1", api_routes)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
}
