use super::*;
use crate::downloader::test_helpers::{self, COMPLETING_WORKER, TestDownloader};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;


/// Test downloader and a router over it
async fn create_test_app(worker: &str) -> (Router, TestDownloader) {
    let t = test_helpers::create_test_downloader(test_helpers::test_config(2), worker).await;
    let config = t.downloader.get_config();
    let app = create_router(Arc::new(t.downloader.clone()), config);
    (app, t)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_api_server_spawns() {
    let (_app, t) = create_test_app(COMPLETING_WORKER).await;

    let mut config = (*t.downloader.get_config()).clone();
    // Port 0 = OS assigns a free port
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();
    let config = Arc::new(config);

    let api_handle = tokio::spawn({
        let downloader = Arc::new(t.downloader.clone());
        async move { start_api_server(downloader, config).await }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!api_handle.is_finished(), "server exited early");
    api_handle.abort();
}

#[tokio::test]
async fn test_cors_enabled() {
    let (app, _t) = create_test_app(COMPLETING_WORKER).await;

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (_app, t) = create_test_app(COMPLETING_WORKER).await;
    let mut config = (*t.downloader.get_config()).clone();
    config.api.cors_enabled = false;
    let app = create_router(Arc::new(t.downloader.clone()), Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}

#[tokio::test]
async fn test_swagger_ui_toggle() {
    let (app, t) = create_test_app(COMPLETING_WORKER).await;
    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut config = (*t.downloader.get_config()).clone();
    config.api.swagger_ui = false;
    let app = create_router(Arc::new(t.downloader.clone()), Arc::new(config));
    let response = app.oneshot(get("/swagger-ui/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
