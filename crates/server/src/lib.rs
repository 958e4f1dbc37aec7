//! HTTP front end and process wiring for asynchronous ticket submissions.

pub mod api;
pub mod metrics;
pub mod state;
