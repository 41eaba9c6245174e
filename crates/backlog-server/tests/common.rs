//! Shared helpers for the server integration tests.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use backlog_server::{app, AppState};
use backlog_store::{create_pool, DbRuntimeSettings, EventIdGenerator, Store};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for oneshot

/// A short deadline keeps empty-buffer polls from stalling the suite.
pub const TEST_POLL_TIMEOUT: Duration = Duration::from_millis(300);

pub fn memory_store() -> Arc<Store> {
    // A single pooled connection: `:memory:` databases are per-connection.
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            busy_timeout_ms: 5000,
            pool_max_size: 1,
        },
    )
    .expect("failed to create pool");
    Arc::new(Store::open(pool).expect("failed to open store"))
}

pub fn test_app(store: Arc<Store>, poll_timeout: Duration) -> Router {
    app(AppState {
        store,
        ids: Arc::new(EventIdGenerator::new().expect("failed to create id generator")),
        poll_timeout,
    })
}

pub async fn post_events(application: &Router, body: &str) -> Response<axum::body::Body> {
    application
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/events")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap()
}

pub async fn get_events(application: &Router, query: &str) -> Response<axum::body::Body> {
    let uri = if query.is_empty() {
        "/events".to_string()
    } else {
        format!("/events?{query}")
    };
    application
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_string(response: Response<axum::body::Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Decodes a poll response body: an array of `[id, payload]` pairs.
pub async fn body_events(
    response: Response<axum::body::Body>,
) -> Vec<(String, serde_json::Value)> {
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Payloads only, in response order.
pub fn payloads(events: &[(String, serde_json::Value)]) -> Vec<serde_json::Value> {
    events.iter().map(|(_, payload)| payload.clone()).collect()
}
