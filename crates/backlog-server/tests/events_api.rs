//! Integration tests for the ingress and poll handlers: ordering, cursor
//! resume, sort directions, limits, and request validation.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn post_then_get_returns_the_event() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    let response = post_events(&application, r#"["evt1"]"#).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "", "POST body should be empty");

    let events = body_events(get_events(&application, "").await).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, json!("evt1"));
}

#[tokio::test]
async fn cursor_resume_walks_a_batch() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    let response = post_events(&application, r#"["evt1","evt2"]"#).await;
    assert_eq!(response.status(), StatusCode::OK);

    let first = body_events(get_events(&application, "limit=1").await).await;
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].1, json!("evt1"));

    let query = format!("after={}&limit=1", first[0].0);
    let second = body_events(get_events(&application, &query).await).await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].1, json!("evt2"));
    assert!(second[0].0 > first[0].0, "ids must be time-ordered");
}

#[tokio::test]
async fn interleaved_posts_preserve_commit_order() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    post_events(&application, r#"["a"]"#).await;
    post_events(&application, r#"["b","c"]"#).await;
    post_events(&application, r#"["d"]"#).await;

    let events = body_events(get_events(&application, "").await).await;
    assert_eq!(
        payloads(&events),
        vec![json!("a"), json!("b"), json!("c"), json!("d")]
    );

    let ids: Vec<&String> = events.iter().map(|(id, _)| id).collect();
    for pair in ids.windows(2) {
        assert!(pair[0] < pair[1], "{} should sort before {}", pair[0], pair[1]);
    }
}

#[tokio::test]
async fn cursor_resume_from_every_position() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"[1, 2, 3, 4, 5]"#).await;

    let all = body_events(get_events(&application, "").await).await;
    assert_eq!(all.len(), 5);

    for k in 0..5 {
        let query = format!("after={}&limit=100", all[k].0);
        if k == 4 {
            // Nothing beyond the last id: the poll times out.
            let response = get_events(&application, &query).await;
            assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
            continue;
        }
        let rest = body_events(get_events(&application, &query).await).await;
        assert_eq!(rest, all[k + 1..].to_vec());
    }
}

#[tokio::test]
async fn descending_mirrors_ascending() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"["a","b"]"#).await;

    let events = body_events(get_events(&application, "sort=desc").await).await;
    assert_eq!(payloads(&events), vec![json!("b"), json!("a")]);
}

#[tokio::test]
async fn descending_resumes_from_cursor() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"["a","b","c"]"#).await;

    let all = body_events(get_events(&application, "").await).await;
    let query = format!("sort=desc&after={}", all[2].0);
    let below = body_events(get_events(&application, &query).await).await;
    assert_eq!(payloads(&below), vec![json!("b"), json!("a")]);
}

#[tokio::test]
async fn limit_bounds_the_response() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"[1, 2, 3, 4, 5, 6, 7]"#).await;

    let events = body_events(get_events(&application, "limit=3").await).await;
    assert_eq!(events.len(), 3);
    assert_eq!(payloads(&events), vec![json!(1), json!(2), json!(3)]);
}

#[tokio::test]
async fn empty_sort_defaults_to_ascending() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"["a","b"]"#).await;

    let events = body_events(get_events(&application, "sort=").await).await;
    assert_eq!(payloads(&events), vec![json!("a"), json!("b")]);

    let events = body_events(get_events(&application, "sort=asc").await).await;
    assert_eq!(payloads(&events), vec![json!("a"), json!("b")]);
}

#[tokio::test]
async fn payloads_survive_byte_identical() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    // Key order and spacing inside a raw value must survive the round trip.
    post_events(&application, r#"[{"b":1,"a":2}, [3,  4], null, "x"]"#).await;

    let response = get_events(&application, "").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains(r#"{"b":1,"a":2}"#), "got: {body}");
    assert!(body.contains("[3,  4]"), "got: {body}");
    assert!(body.contains("null"), "got: {body}");
}

#[tokio::test]
async fn empty_batch_is_accepted() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    let response = post_events(&application, "[]").await;
    assert_eq!(response.status(), StatusCode::OK);

    // Nothing was stored, so a poll times out.
    let response = get_events(&application, "").await;
    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
}

// ── Request validation ──────────────────────────────────────────────

#[tokio::test]
async fn malformed_body_is_rejected() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    let response = post_events(&application, "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_events(&application, r#"{"not": "an array"}"#).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_events(&application, "").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_sort_is_rejected() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    let response = get_events(&application, "sort=sideways").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_string(response).await;
    assert!(body.contains("sideways"), "got: {body}");
}

#[tokio::test]
async fn invalid_limit_is_rejected() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);

    let response = get_events(&application, "limit=1001").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_events(&application, "limit=-1").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get_events(&application, "limit=ten").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn limit_at_the_maximum_is_accepted() {
    let application = test_app(memory_store(), TEST_POLL_TIMEOUT);
    post_events(&application, r#"["a"]"#).await;

    let events = body_events(get_events(&application, "limit=1000").await).await;
    assert_eq!(events.len(), 1);
}
