//! Health, metrics and cross-cutting HTTP behavior.

mod common;

use axum::http::StatusCode;
use common::{json_body, TestApp};

#[tokio::test]
async fn health_check_returns_200() {
    let app = TestApp::spawn();

    let (status, body) = json_body(app.get("/health").await).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "sso-service-test");
}

#[tokio::test]
async fn metrics_exposes_http_counters() {
    sso_service::services::metrics::init_metrics().unwrap();
    let app = TestApp::spawn();

    app.register("a@b.com", "abcd").await;
    let response = app.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("http_requests_total"));
    assert!(text.contains("path=\"/register\""));
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let app = TestApp::spawn();

    let response = app.get("/health").await;

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = TestApp::spawn();
    assert_eq!(app.get("/nope").await.status(), StatusCode::NOT_FOUND);
}
