//! Integration tests for the HTTP front door.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{dispatcher, registry, FakeBus, FakeProjects, FakeProvider};
use labeler::plugins::buckets;
use labeler::server::{build_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

struct Harness {
    app: Router,
    provider: Arc<FakeProvider>,
    bus: Arc<FakeBus>,
}

fn harness(token: Option<&str>) -> Harness {
    let provider = Arc::new(
        FakeProvider::new("storage.googleapis.com/Bucket")
            .with_resource("b1", json!({ "name": "b1", "location": "US-EAST1" }))
            .with_page(vec![json!({ "name": "b1", "location": "EU" })]),
    );
    let bus = Arc::new(FakeBus::default());
    let dispatcher = dispatcher(
        registry(vec![buckets::plugin(provider.clone(), None)]),
        &[],
        FakeProjects::of(&["p1", "p2"]),
        bus.clone(),
    );
    let state = Arc::new(AppState::new(dispatcher, token.map(str::to_string)));

    Harness {
        app: build_router(state),
        provider,
        bus,
    }
}

fn push_body(data: &Value) -> Body {
    let envelope = json!({
        "message": { "data": STANDARD.encode(data.to_string()), "messageId": "1" },
        "subscription": "projects/host/subscriptions/test"
    });
    Body::from(envelope.to_string())
}

fn push(uri: &str, data: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(push_body(data))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let h = harness(Some(TOKEN));
    let response = h
        .app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_schedule_requires_cron_header_or_token() {
    let h = harness(Some(TOKEN));
    let response = h
        .app
        .oneshot(Request::builder().uri("/schedule").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(h.bus.requests().is_empty());
}

#[tokio::test]
async fn test_schedule_with_cron_header_fans_out() {
    let h = harness(Some(TOKEN));
    let request = Request::builder()
        .uri("/schedule")
        .header("X-Appengine-Cron", "true")
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["published"], 2);
    assert_eq!(h.bus.requests().len(), 2);
}

#[tokio::test]
async fn test_schedule_with_token() {
    let h = harness(Some(TOKEN));
    let request = Request::builder()
        .uri(format!("/schedule?token={TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_label_one_labels_bucket() {
    let h = harness(Some(TOKEN));
    let entry = json!({
        "protoPayload": { "methodName": "storage.buckets.create" },
        "resource": { "labels": { "project_id": "p1", "bucket_name": "b1" } }
    });

    let response = h
        .app
        .oneshot(push(&format!("/label_one?token={TOKEN}"), &entry))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["labeled"], 1);
    assert_eq!(h.provider.patched_keys(), vec![vec!["b1".to_string()]]);
}

#[tokio::test]
async fn test_push_with_wrong_token_is_forbidden() {
    let h = harness(Some(TOKEN));
    let data = json!({ "projectId": "p1", "pluginName": "Buckets" });

    let response = h.app.oneshot(push("/do_label?token=wrong", &data)).await.unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(h.provider.list_count(), 0);
}

#[tokio::test]
async fn test_push_without_configured_token_is_bad_request() {
    let h = harness(None);
    let data = json!({ "projectId": "p1", "pluginName": "Buckets" });

    let response = h.app.oneshot(push("/do_label?token=anything", &data)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_do_label_unknown_plugin_is_not_found() {
    let h = harness(Some(TOKEN));
    let data = json!({ "projectId": "p1", "pluginName": "Nope" });

    let response = h
        .app
        .oneshot(push(&format!("/do_label?token={TOKEN}"), &data))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(h.provider.list_count(), 0);
}

#[tokio::test]
async fn test_do_label_sweeps_project() {
    let h = harness(Some(TOKEN));
    let data = json!({ "project_id": "p1", "plugin": "Buckets" });

    let response = h
        .app
        .oneshot(push(&format!("/do_label?token={TOKEN}"), &data))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["labeled"], 1);
    assert_eq!(body["pluginName"], "Buckets");
}

#[tokio::test]
async fn test_malformed_envelope_is_bad_request() {
    let h = harness(Some(TOKEN));
    let request = Request::builder()
        .method("POST")
        .uri(format!("/label_one?token={TOKEN}"))
        .body(Body::from("not json"))
        .unwrap();

    let response = h.app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["status"], "error");
}
