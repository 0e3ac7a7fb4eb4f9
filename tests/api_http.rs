// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /analyze (demo mode, synthetic tier only)
// - GET /status
// - PUT /demo-mode

use serde_json::json;
use serde_json::Value as Json;
use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use tower::ServiceExt as _; // for `oneshot`

use social_sentiment::api::{create_router, AppState};
use social_sentiment::{PipelineBuilder, Settings};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Router over a pipeline with no live tiers; starts in demo mode.
fn test_router() -> Router {
    let pipeline = PipelineBuilder::new(Settings::default()).seed(7).build();
    create_router(AppState::new(pipeline))
}

async fn read_json(resp: axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

fn json_request(method: &str, uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build request")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    assert_eq!(String::from_utf8(bytes).expect("utf8").trim(), "ok");
}

#[tokio::test]
async fn api_analyze_returns_items_summary_and_status() {
    let app = test_router();

    let req = json_request(
        "POST",
        "/analyze",
        json!({ "mode": "keyword", "subject": "  AI  ", "count": 5 }),
    );
    let resp = app.oneshot(req).await.expect("oneshot /analyze");
    assert!(
        resp.status().is_success(),
        "POST /analyze should be 2xx, got {}",
        resp.status()
    );

    let v = read_json(resp).await;
    assert_eq!(v["subject"], "AI", "subject is echoed trimmed");
    assert_eq!(v["empty"], false);

    let items = v["items"].as_array().expect("items array");
    assert_eq!(items.len(), 5);
    for it in items {
        assert_eq!(it["source_tag"], "synthetic");
        assert!(!it["normalized_text"].as_str().unwrap_or("").is_empty());
        assert!(it.get("polarity").is_some() && it.get("subjectivity").is_some());
        let label = it["sentiment_label"].as_str().expect("label");
        assert!(["Positive", "Neutral", "Negative"].contains(&label));
    }

    assert_eq!(v["summary"]["total"], 5);
    assert_eq!(v["status"]["demo_mode_forced"], true);
    assert_eq!(v["status"]["total_live_calls"], 0);
}

#[tokio::test]
async fn api_analyze_clamps_count_to_ceiling() {
    let app = test_router();

    let req = json_request(
        "POST",
        "/analyze",
        json!({ "mode": "subject_timeline", "subject": "@acme", "count": 5000 }),
    );
    let resp = app.oneshot(req).await.expect("oneshot /analyze");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v["subject"], "acme", "leading @ is dropped for timelines");
    assert_eq!(v["items"].as_array().expect("items").len(), 200);
}

#[tokio::test]
async fn api_analyze_rejects_unknown_mode() {
    let app = test_router();

    let req = json_request(
        "POST",
        "/analyze",
        json!({ "mode": "firehose", "subject": "AI" }),
    );
    let resp = app.oneshot(req).await.expect("oneshot /analyze");
    assert!(
        resp.status().is_client_error(),
        "unknown mode should be 4xx, got {}",
        resp.status()
    );
}

#[tokio::test]
async fn api_status_reports_no_credentials_in_demo() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/status")
        .body(Body::empty())
        .expect("build GET /status");
    let resp = app.oneshot(req).await.expect("oneshot /status");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v["demo_mode_forced"], true);
    assert_eq!(v["has_valid_credentials"], false);
    assert_eq!(v["is_rate_limited"], false);
    assert_eq!(v["remaining_block_seconds"], 0);
}

#[tokio::test]
async fn api_demo_mode_toggle_is_reflected_in_status() {
    let app = test_router();

    let req = json_request("PUT", "/demo-mode", json!({ "enabled": false }));
    let resp = app.clone().oneshot(req).await.expect("oneshot /demo-mode");
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(read_json(resp).await["demo_mode_forced"], false);

    let req = Request::builder()
        .method("GET")
        .uri("/status")
        .body(Body::empty())
        .expect("build GET /status");
    let resp = app.oneshot(req).await.expect("oneshot /status");
    assert_eq!(read_json(resp).await["demo_mode_forced"], false);
}
