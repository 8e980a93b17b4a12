//! HTTP trigger surface tests
//!
//! Routes are driven through `tower::ServiceExt::oneshot` over scripted
//! sources and an in-memory database.

mod helpers;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;
use uuid::Uuid;

use helpers::{harness, netdisco, wait_finished, FakeSource, Harness, Script};
use laim_sync::models::SourceKind;
use laim_sync::{build_router, AppState};

fn app(h: &Harness) -> Router {
    build_router(AppState::new(h.service.clone()))
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder().method(method).uri(uri).body(Body::empty()).unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn one_switch() -> Script {
    Script::Devices(vec![netdisco("10.0.0.1", "core-sw1", Some("FOC1111"), None, Some("WS-C3850"))])
}

#[tokio::test]
async fn test_health_reports_module_and_sources() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);

    let (status, body) = send(&app, request("GET", "/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "laim-sync");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_u64());
    assert_eq!(body["configured_sources"], json!(["netdisco"]));
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_start_then_poll_status() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);

    let (status, body) = send(&app, json_request("POST", "/sync/start", json!({"scope": "all"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "running");
    assert!(body["started_at"].is_string());

    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    wait_finished(&h.service, job_id).await;

    let (status, body) = send(&app, request("GET", &format!("/sync/status/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["scope"], "all");
    assert_eq!(body["totals"]["created"], 1);
    assert_eq!(body["sources"]["netdisco"]["outcome"]["state"], "ok");
}

#[tokio::test]
async fn test_start_rejects_bad_scope() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);

    let (status, body) = send(&app, json_request("POST", "/sync/start", json!({"scope": "observium"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app, json_request("POST", "/sync/start", json!({"scope": "librenms"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_conflicts_with_active_run() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, Script::WaitForCancel)]).await;
    let app = app(&h);

    let (status, body) = send(&app, json_request("POST", "/sync/start", json!({"scope": "all"}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app, json_request("POST", "/sync/start", json!({"scope": "netdisco"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (status, body) = send(&app, request("POST", &format!("/sync/cancel/{}", job_id))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["cancel_requested"], true);

    let job = wait_finished(&h.service, job_id.parse().unwrap()).await;
    assert!(job.cancelled);

    let (status, _) = send(&app, request("POST", &format!("/sync/cancel/{}", job_id))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);
    let unknown = Uuid::new_v4();

    let (status, body) = send(&app, request("GET", &format!("/sync/status/{}", unknown))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, request("POST", &format!("/sync/cancel/{}", unknown))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, request("GET", "/sync/status/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_job_history_newest_first() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);

    let mut ids = Vec::new();
    for _ in 0..3 {
        let job = h.service.start(laim_sync::models::SyncScope::All).await.unwrap();
        wait_finished(&h.service, job.id).await;
        ids.push(job.id.to_string());
    }

    let (status, body) = send(&app, request("GET", "/sync/jobs?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], ids[2]);
    assert_eq!(jobs[1]["id"], ids[1]);

    let (_, body) = send(&app, request("GET", "/sync/jobs")).await;
    assert_eq!(body.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_source_connection_check() {
    let h = harness(&[
        FakeSource::new(SourceKind::Netdisco, one_switch()),
        FakeSource::new(SourceKind::Librenms, Script::AuthFailure),
    ])
    .await;
    let app = app(&h);

    let (status, body) = send(&app, request("GET", "/sync/sources/netdisco/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);

    let (status, body) = send(&app, request("GET", "/sync/sources/librenms/test")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "SOURCE_AUTH_FAILED");

    let (status, _) = send(&app, request("GET", "/sync/sources/observium/test")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unconfigured_source_check_is_bad_request() {
    let h = harness(&[FakeSource::new(SourceKind::Netdisco, one_switch())]).await;
    let app = app(&h);

    let (status, _) = send(&app, request("GET", "/sync/sources/librenms/test")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
