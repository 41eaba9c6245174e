//! Long-poll dispatcher for `GET /events`.
//!
//! A poll subscribes to store change notifications, then immediately runs a
//! read attempt so events already in the buffer are returned without waiting
//! for a signal. An empty attempt blocks on whichever comes first: a change
//! signal (re-attempt), the deadline (408), or the client going away (the
//! handler future is dropped, which releases the subscription).

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use backlog_store::{Store, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::sync::Arc;
use tokio::time::Instant;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// Query parameters for `GET /events`.
#[derive(Debug, Deserialize)]
pub struct PollQuery {
    /// Resume cursor: the id of the last event already seen.
    pub after: Option<String>,
    /// Maximum number of events to return (default 100, max 1000).
    pub limit: Option<i64>,
    /// `asc` (default) or `desc`.
    pub sort: Option<String>,
}

/// A single event as returned to pollers: a two-element array of the event
/// id and the verbatim payload.
#[derive(Debug, Serialize)]
pub struct PolledEvent(pub String, pub Box<RawValue>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
struct PollParams {
    after: Option<String>,
    limit: usize,
    order: Order,
}

fn bad_request(reason: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "error": reason })),
    )
        .into_response()
}

fn internal_error(reason: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": reason })),
    )
        .into_response()
}

/// Handler for `GET /events`.
pub async fn poll_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<PollQuery>,
) -> Response {
    let order = match query.sort.as_deref() {
        None | Some("") | Some("asc") => Order::Asc,
        Some("desc") => Order::Desc,
        Some(other) => return bad_request(format!("invalid sort value: {other}")),
    };

    let limit = match query.limit {
        None => DEFAULT_LIMIT,
        Some(l) if !(0..=MAX_LIMIT).contains(&l) => {
            return bad_request(format!(
                "requested limit {l} is outside the allowed range 0..={MAX_LIMIT}"
            ));
        }
        Some(l) => l,
    };

    let params = PollParams {
        after: query.after.filter(|a| !a.is_empty()),
        limit: limit as usize,
        order,
    };

    // Subscribe before the first attempt: a commit that lands between the
    // attempt and the wait still resolves `changed()` immediately.
    let mut changes = state.store.subscribe();
    let deadline = Instant::now() + state.poll_timeout;

    loop {
        let store = state.store.clone();
        let attempt_params = params.clone();
        let page = match tokio::task::spawn_blocking(move || read_page(&store, &attempt_params))
            .await
        {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "could not read events");
                return internal_error(format!("could not read events: {e}"));
            }
            Err(e) => {
                tracing::error!(error = %e, "event read task join error");
                return internal_error(format!("task join error: {e}"));
            }
        };

        if !page.is_empty() {
            let mut events = Vec::with_capacity(page.len());
            for (id, payload) in page {
                let text = match String::from_utf8(payload) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::error!(error = %e, "stored payload is not valid utf-8");
                        return internal_error("corrupt stored payload".to_string());
                    }
                };
                let raw = match RawValue::from_string(text) {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::error!(error = %e, "stored payload is not valid json");
                        return internal_error("corrupt stored payload".to_string());
                    }
                };
                events.push(PolledEvent(id, raw));
            }
            return (StatusCode::OK, Json(events)).into_response();
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    // The store side of the channel is gone; shutting down.
                    return internal_error("server shutting down".to_string());
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                return (
                    StatusCode::REQUEST_TIMEOUT,
                    Json(serde_json::json!({ "error": "request timed out" })),
                )
                    .into_response();
            }
        }
    }
}

/// One read attempt: position the cursor and collect up to `limit` events.
///
/// `after` means "strictly after this id" in the iteration direction. When
/// descending, a cursor id that has since been pruned resumes from the
/// largest key below it; a cursor id beyond every stored key resumes from
/// the tail.
fn read_page(store: &Store, p: &PollParams) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
    store.read(|tx| {
        let mut cur = tx.cursor();

        match (p.order, p.after.as_deref()) {
            (Order::Asc, None) => cur.first()?,
            (Order::Desc, None) => cur.last()?,
            (Order::Asc, Some(after)) => {
                cur.seek(after)?;
                if cur.key() == Some(after) {
                    cur.next()?;
                }
            }
            (Order::Desc, Some(after)) => {
                cur.seek(after)?;
                if cur.is_done() {
                    // Every key is below `after`.
                    cur.last()?;
                } else {
                    // Positioned on `after` itself, or on the smallest key
                    // above it if `after` was pruned. Either way the resume
                    // point is the next key down.
                    cur.prev()?;
                }
            }
        }

        let mut page = Vec::new();
        while page.len() < p.limit {
            let Some(key) = cur.key() else { break };
            let Some(value) = cur.value() else { break };
            page.push((key.to_string(), value.to_vec()));
            match p.order {
                Order::Asc => cur.next()?,
                Order::Desc => cur.prev()?,
            }
        }
        Ok(page)
    })
}
