#![cfg(feature = "server")]

mod common;

use common::{BUSYBOX, FakeRuntime, image};
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use volshift::orchestrator::{Orchestrator, OrchestratorConfig};
use volshift::server::VolumeApiService;

fn service(fake: Arc<FakeRuntime>) -> VolumeApiService {
    let orch = Orchestrator::new(fake, OrchestratorConfig::new(image(BUSYBOX)));
    VolumeApiService::new(orch)
}

async fn send(svc: &VolumeApiService, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap();
    let resp = svc.respond(req).await;
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_progress_starts_empty() {
    let svc = service(Arc::new(FakeRuntime::new()));
    let (status, body) = send(&svc, Method::GET, "/progress", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({}));
}

#[tokio::test]
async fn test_clone_returns_created() {
    let fake = Arc::new(FakeRuntime::new().with_running("A", "c1"));
    let svc = service(fake.clone());

    let (status, body) = send(&svc, Method::POST, "/volumes/A/clone?destVolume=B", "").await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["volume"], "A");
    assert_eq!(body["kind"], "clone");
    assert_eq!(body["restartedContainers"], serde_json::json!(["c1"]));
    assert_eq!(fake.created()[0].binds, vec!["A:/from", "B:/to"]);
}

#[tokio::test]
async fn test_export_returns_ok() {
    let svc = service(Arc::new(FakeRuntime::new()));
    let (status, _) = send(
        &svc,
        Method::GET,
        "/volumes/data/export?path=%2Fbackups%2Fdata.tar.gz",
        "",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_encoded_volume_name_is_decoded() {
    let fake = Arc::new(FakeRuntime::new());
    let svc = service(fake.clone());

    let (status, body) = send(
        &svc,
        Method::GET,
        "/volumes/app%2Ddata/export?path=%2Fbackups%2Fapp.tar.gz",
        "",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["volume"], "app-data");
    assert_eq!(fake.created()[0].binds[0], "app-data:/volume:ro");
}

#[tokio::test]
async fn test_missing_parameter_is_bad_request() {
    let svc = service(Arc::new(FakeRuntime::new()));
    let (status, body) = send(&svc, Method::GET, "/volumes/data/export", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");
}

#[tokio::test]
async fn test_worker_failure_is_internal_error() {
    let svc = service(Arc::new(FakeRuntime::new().with_exit_code(2)));
    let (status, body) = send(&svc, Method::GET, "/volumes/data/import?path=/in.tar.gz", "").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "worker_exit");
    assert_eq!(body["message"], "container exited with status code 2");
}

#[tokio::test]
async fn test_unauthorized_pull_is_401() {
    let svc = service(Arc::new(FakeRuntime::new().unauthorized()));
    let (status, body) = send(
        &svc,
        Method::POST,
        "/volumes/data/pull",
        r#"{"reference":"ghcr.io/acme/data:1","base64EncodedAuth":"Cg=="}"#,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
}

#[tokio::test]
async fn test_pull_without_body_is_bad_request() {
    let svc = service(Arc::new(FakeRuntime::new()));
    let (status, body) = send(&svc, Method::POST, "/volumes/data/pull", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "bad_request");
}

#[tokio::test]
async fn test_unknown_route_and_wrong_method() {
    let svc = service(Arc::new(FakeRuntime::new()));

    let (status, _) = send(&svc, Method::GET, "/volumes/data/resize", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&svc, Method::GET, "/volumes/A/clone?destVolume=B", "").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["kind"], "method_not_allowed");
}
