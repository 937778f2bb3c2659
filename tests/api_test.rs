mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use common::{ScriptedTransport, relay_config, relay_config_json, wait_for_entries};
use relaybox::api::{AppState, router};
use relaybox::controller::RelayController;

fn build_test_app(controller: Arc<RelayController>) -> Router {
    router(AppState::new(controller))
}

fn idle_controller() -> Arc<RelayController> {
    Arc::new(RelayController::new(Arc::new(ScriptedTransport::default())))
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = build_test_app(idle_controller());
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn test_config_missing_is_404() {
    let app = build_test_app(idle_controller());
    let (status, body) = call(&app, "GET", "/api/relay-config/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "No configuration loaded");
}

#[tokio::test]
async fn test_start_without_config_is_400() {
    let app = build_test_app(idle_controller());
    let (status, body) = call(&app, "POST", "/api/relay-start/", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No configuration loaded");
}

#[tokio::test]
async fn test_config_round_trip_is_redacted() {
    let temp = TempDir::new().unwrap();
    let app = build_test_app(idle_controller());

    let (status, body) = call(&app, "POST", "/api/relay-config/", Some(relay_config_json(&temp))).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["active"], false);
    assert_eq!(body["destinations_count"], 3);

    let (status, body) = call(&app, "GET", "/api/relay-config/", None).await;
    assert_eq!(status, StatusCode::OK);
    let raw = body.to_string();
    assert!(!raw.contains("s3cret"), "credential leaked: {raw}");
    assert!(!raw.contains("ZC2_PASSWORD"), "secret reference leaked: {raw}");
    for destination in body["destinations"].as_array().unwrap() {
        assert_eq!(destination["credential"], "***");
    }
    assert_eq!(body["file_patterns"]["zc1_"], json!(["zc1"]));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let temp = TempDir::new().unwrap();
    let app = build_test_app(idle_controller());

    let mut config = relay_config_json(&temp);
    config["file_patterns"]["zc9_"] = json!(["zc9"]);
    let (status, body) = call(&app, "POST", "/api/relay-config/", Some(config)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("zc9"), "body: {body}");

    let (status, _) = call(&app, "GET", "/api/relay-config/", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = build_test_app(idle_controller());
    let request = Request::builder()
        .method("POST")
        .uri("/api/send-file/")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_start_status_send_stop() {
    let temp = TempDir::new().unwrap();
    let controller =
        Arc::new(RelayController::with_config(Arc::new(ScriptedTransport::default()), relay_config(&temp)).unwrap());
    let app = build_test_app(controller.clone());

    let (status, body) = call(&app, "POST", "/api/send-file/", Some(json!({"file_path": "/tmp/x"}))).await;
    assert_eq!(status, StatusCode::CONFLICT, "body: {body}");

    let (status, body) = call(&app, "POST", "/api/relay-start/", None).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["message"], "File relay system started");
    assert_eq!(body["active"], true);

    let (status, body) = call(&app, "GET", "/api/relay-status/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], true);
    assert_eq!(body["config_loaded"], true);
    assert!(body["receiver_addr"].is_string());

    let missing = temp.path().join("nope.bin");
    let (status, body) = call(
        &app,
        "POST",
        "/api/send-file/",
        Some(json!({"file_path": missing.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid file path");

    let (status, _) = call(&app, "POST", "/api/send-file/", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let file = temp.path().join("zc1_api.bin");
    std::fs::write(&file, b"api").unwrap();
    let (status, body) = call(
        &app,
        "POST",
        "/api/send-file/",
        Some(json!({"file_path": file.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {body}");
    assert_eq!(body["targets"], json!(["zc1"]));
    let job_id = body["job_id"].as_str().unwrap().to_string();

    wait_for_entries(&controller, 1).await;

    let (status, body) = call(&app, "GET", &format!("/api/ledger/{job_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["file_name"], "zc1_api.bin");
    assert_eq!(body["destinations"][0]["device"], "zc1");
    assert_eq!(body["destinations"][0]["status"], "success");

    let (status, body) = call(&app, "GET", "/api/ledger/?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(&app, "POST", "/api/relay-stop/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File relay system stopped");
    assert_eq!(body["was_running"], true);
    assert_eq!(body["incomplete"], json!([]));

    let (_, body) = call(&app, "GET", "/api/relay-status/", None).await;
    assert_eq!(body["active"], false);
}

#[tokio::test]
async fn test_ledger_lookups() {
    let app = build_test_app(idle_controller());

    let (status, body) = call(&app, "GET", "/api/ledger/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, _) = call(&app, "GET", "/api/ledger/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(&app, "GET", &format!("/api/ledger/{}", uuid::Uuid::now_v7()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_relay_bundle_endpoint() {
    let temp = TempDir::new().unwrap();
    let controller =
        Arc::new(RelayController::with_config(Arc::new(ScriptedTransport::default()), relay_config(&temp)).unwrap());
    let app = build_test_app(controller.clone());
    controller.start(None).await.unwrap();

    let bundle = temp.path().join("bundle");
    std::fs::create_dir_all(&bundle).unwrap();
    std::fs::write(bundle.join("config.json"), b"{}").unwrap();
    std::fs::write(bundle.join("all_one.bin"), b"1").unwrap();

    let (status, body) = call(
        &app,
        "POST",
        "/api/relay-bundle/",
        Some(json!({"bundle_dir": bundle.display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED, "body: {body}");
    assert_eq!(body["submitted"].as_array().unwrap().len(), 1);
    assert_eq!(body["skipped"].as_array().unwrap().len(), 1);

    let (status, _) = call(
        &app,
        "POST",
        "/api/relay-bundle/",
        Some(json!({"bundle_dir": temp.path().join("absent").display().to_string()})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    controller.stop().await;
}
