//! Backlog server library logic.
//!
//! Wires the event store into the HTTP surface: ingress (`POST /events`),
//! the long-poll dispatcher (`GET /events`), the metrics listener, and the
//! retention task.

pub mod api_ingest;
pub mod api_poll;
pub mod config;
pub mod metrics;
pub mod retention;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use backlog_store::{EventIdGenerator, Store};
use std::sync::Arc;
use std::time::Duration;

/// How long a poll blocks waiting for events before answering 408.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(20);

/// Application state shared across all request handlers.
pub struct AppState {
    /// The event store.
    pub store: Arc<Store>,
    /// Identifier generator for ingress.
    pub ids: Arc<EventIdGenerator>,
    /// Long-poll deadline; [`DEFAULT_POLL_TIMEOUT`] outside of tests.
    pub poll_timeout: Duration,
}

/// Builds the event API router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route(
            "/events",
            post(api_ingest::publish_events_handler).get(api_poll::poll_events_handler),
        )
        .layer(Extension(Arc::new(state)))
}
