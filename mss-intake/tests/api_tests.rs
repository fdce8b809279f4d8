//! HTTP API integration tests

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use helpers::{SqliteFixture, UnavailableStore};
use mss_common::EventBus;
use mss_intake::admission::PlaceholderService;
use mss_intake::api::TENANT_HEADER;
use mss_intake::{build_router, AppState};

async fn test_app() -> (Router, SqliteFixture) {
    let fixture = SqliteFixture::new().await;
    let app = build_router(AppState::new(Arc::clone(&fixture.service), 100));
    (app, fixture)
}

fn post_json(uri: &str, tenant: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(tenant) = tenant {
        builder = builder.header(TENANT_HEADER, tenant);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn post_empty(uri: &str, tenant: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(TENANT_HEADER, tenant)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str, tenant: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(TENANT_HEADER, tenant)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _fixture) = test_app().await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "mss-intake");
    assert_eq!(body["in_flight"], 0);
}

#[tokio::test]
async fn test_create_then_reuse() {
    let (app, _fixture) = test_app().await;
    let body = json!({"subject_id": 123, "task_id": 7, "payload": {"audio": "a.webm"}});

    let (status, created) = send(&app, post_json("/api/placeholders", Some("1"), body.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["outcome"], "created");
    assert_eq!(created["generation"], 1);
    assert_eq!(created["status"], "pending");

    let (status, reused) = send(&app, post_json("/api/placeholders", Some("1"), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reused["outcome"], "reused");
    assert_eq!(reused["id"], created["id"]);
}

#[tokio::test]
async fn test_create_requires_tenant_header() {
    let (app, fixture) = test_app().await;

    let (status, body) = send(&app, post_json("/api/placeholders", None, json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(&app, post_json("/api/placeholders", Some("zero"), json!({}))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(fixture.row_count().await, 0);
}

#[tokio::test]
async fn test_create_rejects_unknown_fields_and_invalid_ids() {
    let (app, _fixture) = test_app().await;

    let (status, body) = send(
        &app,
        post_json("/api/placeholders", Some("1"), json!({"subject_id": 1, "school": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(
        &app,
        post_json("/api/placeholders", Some("1"), json!({"subject_id": -5})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_finalize_flow_and_next_generation() {
    let (app, _fixture) = test_app().await;
    let body = json!({"subject_id": 5, "task_id": 6});

    let (_, first) = send(&app, post_json("/api/placeholders", Some("1"), body.clone())).await;
    let id = first["id"].as_str().unwrap().to_string();

    let finalize_uri = format!("/api/placeholders/{}/finalize", id);
    let (status, record) = send(&app, post_empty(&finalize_uri, "1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "finalized");

    // idempotent
    let (status, _) = send(&app, post_empty(&finalize_uri, "1")).await;
    assert_eq!(status, StatusCode::OK);

    let (status, second) = send(&app, post_json("/api/placeholders", Some("1"), body)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_ne!(second["id"], first["id"]);
    assert_eq!(second["generation"], 2);

    let (status, history) = send(
        &app,
        get("/api/placeholders/history?subject_id=5&task_id=6", "1"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let records = history["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["id"], first["id"]);
    assert_eq!(records[1]["status"], "pending");
}

#[tokio::test]
async fn test_finalize_after_abandon_conflicts() {
    let (app, _fixture) = test_app().await;

    let (_, created) = send(
        &app,
        post_json("/api/placeholders", Some("1"), json!({"subject_id": 1, "task_id": 1})),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, record) = send(&app, post_empty(&format!("/api/placeholders/{}/abandon", id), "1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "abandoned");

    let (status, body) = send(&app, post_empty(&format!("/api/placeholders/{}/finalize", id), "1")).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_other_tenant_sees_not_found() {
    let (app, _fixture) = test_app().await;

    let (_, created) = send(
        &app,
        post_json("/api/placeholders", Some("1"), json!({"subject_id": 9, "task_id": 9})),
    )
    .await;
    let id = created["id"].as_str().unwrap();

    let (status, _) = send(&app, get(&format!("/api/placeholders/{}", id), "2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, post_empty(&format!("/api/placeholders/{}/finalize", id), "2")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, record) = send(&app, get(&format!("/api/placeholders/{}", id), "1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "pending");
    assert_eq!(record["context"]["tenant_id"], 1);
}

#[tokio::test]
async fn test_malformed_and_unknown_ids() {
    let (app, _fixture) = test_app().await;

    let (status, _) = send(&app, get("/api/placeholders/not-a-uuid", "1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let unknown = uuid::Uuid::new_v4();
    let (status, body) = send(&app, get(&format!("/api/placeholders/{}", unknown), "1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_storage_unavailable_maps_to_503() {
    let service = Arc::new(PlaceholderService::new(
        Arc::new(UnavailableStore::default()),
        EventBus::new(8),
    ));
    let app = build_router(AppState::new(service, 30));

    let response = app
        .oneshot(post_json(
            "/api/placeholders",
            Some("1"),
            json!({"subject_id": 1, "task_id": 1}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["error"]["code"], "STORAGE_UNAVAILABLE");
}

#[tokio::test]
async fn test_event_stream_filters_by_tenant() {
    let (app, _fixture) = test_app().await;

    let response = app.clone().oneshot(get("/events", "1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    send(&app, post_json("/api/placeholders", Some("2"), json!({"subject_id": 1}))).await;
    send(&app, post_json("/api/placeholders", Some("1"), json!({"subject_id": 1}))).await;

    let frame = tokio::time::timeout(std::time::Duration::from_secs(5), body.frame())
        .await
        .expect("no event received")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();

    assert!(text.contains("event: PlaceholderCreated"), "frame: {}", text);
    assert!(text.contains("\"tenant_id\":1"), "frame: {}", text);
}
