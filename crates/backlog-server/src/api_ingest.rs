//! Ingress handler for `POST /events`.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use backlog_store::{EventId, StoreError};
use serde_json::value::RawValue;
use std::sync::Arc;

/// Handler for `POST /events`.
///
/// The body is a JSON array of arbitrary values. Each element gets a
/// freshly minted id and the whole batch is written in one transaction, so
/// readers see either all of the request's events or none of them.
///
/// Payloads are decoded as raw values only to confirm they are well-formed
/// JSON; the stored bytes are the original text, re-emitted verbatim on
/// reads.
pub async fn publish_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Response {
    let payloads: Vec<Box<RawValue>> = match serde_json::from_slice(&body) {
        Ok(payloads) => payloads,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": format!("could not decode request: {e}") })),
            )
                .into_response();
        }
    };

    let mut batch: Vec<(EventId, Vec<u8>)> = Vec::with_capacity(payloads.len());
    for payload in &payloads {
        let id = match state.ids.next() {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(error = %e, "could not generate event id");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({
                        "error": format!("could not generate event id: {e}")
                    })),
                )
                    .into_response();
            }
        };
        batch.push((id, payload.get().as_bytes().to_vec()));
    }

    let store = state.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        store.write(|tx| {
            for (id, payload) in &batch {
                tx.put(id, payload)?;
            }
            Ok::<_, StoreError>(())
        })
    })
    .await;

    match result {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "could not store events");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("could not store events: {e}") })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "event write task join error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": format!("task join error: {e}") })),
            )
                .into_response()
        }
    }
}
