//! Prometheus metrics listener.
//!
//! Served on its own address, separate from the event API. The buffer
//! contributes a single gauge, `event_buffer_size`, sampled by a read
//! transaction at scrape time. It is a gauge rather than a counter because
//! retention shrinks it.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use backlog_store::Store;
use std::sync::Arc;

/// Builds the metrics router.
pub fn metrics_app(store: Arc<Store>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(Extension(store))
}

/// Handler for `GET /metrics` in the Prometheus text exposition format.
async fn metrics_handler(Extension(store): Extension<Arc<Store>>) -> Response {
    let result = tokio::task::spawn_blocking(move || store.read(|tx| tx.len())).await;

    match result {
        Ok(Ok(size)) => {
            let body = format!(
                "# HELP event_buffer_size Number of events in the buffer.\n\
                 # TYPE event_buffer_size gauge\n\
                 event_buffer_size {size}\n"
            );
            (
                StatusCode::OK,
                [(
                    header::CONTENT_TYPE,
                    "text/plain; version=0.0.4; charset=utf-8",
                )],
                body,
            )
                .into_response()
        }
        Ok(Err(e)) => {
            tracing::error!(error = %e, "could not collect metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("could not collect metrics: {e}"),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "metrics task join error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("task join error: {e}"),
            )
                .into_response()
        }
    }
}
