//! HTTP routing integration tests
//!
//! Drives the router with `oneshot` requests. Jobs use the scripted fake
//! launcher and clips the delayed renderer double.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chorus_common::config::JobsConfig;
use chorus_server::clips::ClipService;
use chorus_server::jobs::{JobRegistry, JobRunner};
use chorus_server::{build_router, AppState};
use helpers::{generate_test_wav, DelayedRenderer, FakeLauncher, ToneConfig};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    launcher: Arc<FakeLauncher>,
    renderer: Arc<DelayedRenderer>,
    _root: TempDir,
}

fn test_app() -> TestApp {
    let root = TempDir::new().unwrap();
    let launcher = Arc::new(FakeLauncher::new());
    let runner = JobRunner::new(launcher.clone(), Duration::from_millis(100));
    let registry = Arc::new(JobRegistry::new(root.path(), runner, 10).unwrap());

    let renderer = Arc::new(DelayedRenderer::new());
    let clips = Arc::new(ClipService::new(renderer.clone(), 100, 2).unwrap());

    let state = AppState::new(registry, clips, JobsConfig::default());
    TestApp {
        router: build_router(state),
        launcher,
        renderer,
        _root: root,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_module_and_cache() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "chorus-server");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["cache_size"], 0);
}

#[tokio::test]
async fn test_stats_reports_cache_counters() {
    let app = test_app();
    let (status, body) = send(&app.router, get("/stats")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["worker_threads"], 2);
    assert_eq!(body["cache"]["capacity"], 100);
    assert_eq!(body["cache"]["hits"], 0);
}

#[tokio::test]
async fn test_run_status_cancel_round_trip() {
    let app = test_app();

    let (status, body) = send(
        &app.router,
        post_json("/inference/run", json!({"files": ["a.wav"], "model": "birdnet"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("inference-"));
    assert!(body["job_folder"].as_str().unwrap().ends_with(&job_id));
    assert_eq!(app.launcher.launch_count(), 1);

    let (status, body) = send(&app.router, get(&format!("/inference/status/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "running");
    assert!(body["message"].is_string());
    assert!(body.get("metadata").is_some());

    let (status, body) = send(&app.router, post_json(&format!("/inference/cancel/{}", job_id), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "signalled");

    let (status, _) = send(&app.router, post_json(&format!("/inference/cancel/{}", job_id), json!({}))).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_status_under_wrong_kind_is_not_found() {
    let app = test_app();
    let (_, body) = send(&app.router, post_json("/training/run", json!({"epochs": 1}))).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, get(&format!("/inference/status/{}", job_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app.router, get("/training/status/training-20240101-000000-00000000")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_kind_and_bad_config_are_bad_requests() {
    let app = test_app();

    let (status, body) = send(&app.router, post_json("/painting/run", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, _) = send(&app.router, post_json("/inference/run", json!([1, 2, 3]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.launcher.launch_count(), 0);
}

#[tokio::test]
async fn test_list_and_clear_jobs() {
    let app = test_app();
    let (_, first) = send(&app.router, post_json("/extraction/run", json!({}))).await;
    let job_id = first["job_id"].as_str().unwrap().to_string();

    let (status, body) = send(&app.router, get("/jobs")).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = body.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["kind"], "extraction");
    assert_eq!(jobs[0]["expected_outputs"][0]["name"], "extraction_task.csv");

    // Still running
    let (status, body) = send(&app.router, delete(&format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    app.launcher.process(0).exit(0);
    let (status, body) = send(&app.router, delete(&format!("/jobs/{}", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], true);
}

#[tokio::test]
async fn test_run_with_name_shows_in_listing() {
    let app = test_app();
    let (status, body) = send(&app.router, post_json("/training/run?name=wren%20survey", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_str().unwrap().to_string();
    send(&app.router, post_json("/inference/run", json!({}))).await;

    let (_, body) = send(&app.router, get("/jobs")).await;
    let jobs = body.as_array().unwrap();
    let named = jobs.iter().find(|j| j["job_id"] == job_id.as_str()).unwrap();
    assert_eq!(named["name"], "wren survey");
    assert!(named["finished_at"].is_null());
    let other = jobs.iter().find(|j| j["job_id"] != job_id.as_str()).unwrap();
    assert!(other["name"].as_str().unwrap().starts_with("inference_task_"));

    app.launcher.process(0).exit(0);
    let (_, body) = send(&app.router, get("/jobs")).await;
    let named = body
        .as_array()
        .unwrap()
        .iter()
        .find(|j| j["job_id"] == job_id.as_str())
        .unwrap()
        .clone();
    assert_eq!(named["status"]["status"], "completed");
    assert!(named["finished_at"].is_string());
}

#[tokio::test]
async fn test_batch_returns_ordered_results_with_errors_inline() {
    let app = test_app();
    let audio = TempDir::new().unwrap();
    let wav = generate_test_wav(&audio.path().join("a.wav"), &ToneConfig::default()).unwrap();

    let body = json!({
        "clips": [
            {"clip_id": "missing", "file_path": audio.path().join("absent.wav"), "start_time": 0.0, "end_time": 3.0},
            {"file_path": wav, "start_time": 0.0, "end_time": 3.0, "settings": {"spectrogram_colormap": "viridis"}},
            {"clip_id": 7, "file_path": wav, "start_time": 0.0, "end_time": 3.0},
        ],
        "settings": {"spectrogram_colormap": "magma", "dB_range": [-90, -10]}
    });
    let (status, body) = send(&app.router, post_json("/clips/batch", body)).await;
    assert_eq!(status, StatusCode::OK);

    let results = body.as_array().unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0]["clip_id"], "missing");
    assert_eq!(results[0]["status"], "error");
    assert!(!results[0]["error"].as_str().unwrap().is_empty());

    assert_eq!(results[1]["clip_id"], "1");
    assert_eq!(results[1]["status"], "success");
    assert_eq!(results[1]["spectrogram_base64"], "png:viridis");

    assert_eq!(results[2]["clip_id"], "7");
    assert_eq!(results[2]["spectrogram_base64"], "png:magma");
    assert_eq!(app.renderer.calls(), 3);
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let app = test_app();
    let (status, _) = send(&app.router, post_json("/clips/batch", json!({"clips": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_batch_with_bad_settings_fails_only_that_clip() {
    let app = test_app();
    let audio = TempDir::new().unwrap();
    let wav = generate_test_wav(&audio.path().join("a.wav"), &ToneConfig::default()).unwrap();

    let body = json!({
        "clips": [
            {"file_path": wav, "start_time": 0.0, "end_time": 1.0, "settings": {"spec_window_size": "big"}},
            {"file_path": wav, "start_time": 0.0, "end_time": 1.0},
        ]
    });
    let (status, body) = send(&app.router, post_json("/clips/batch", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["status"], "error");
    assert!(body[0]["error"].as_str().unwrap().contains("Invalid clip settings"));
    assert_eq!(body[1]["status"], "success");
}

#[tokio::test]
async fn test_single_clip_and_cache_clear() {
    let app = test_app();
    let audio = TempDir::new().unwrap();
    let wav = generate_test_wav(&audio.path().join("a.wav"), &ToneConfig::default()).unwrap();
    let uri = format!(
        "/clip?file_path={}&start_time=0.5&end_time=2.5&spectrogram_colormap=inferno&dB_range=%5B-70%2C-30%5D",
        wav.display()
    );

    let (status, body) = send(&app.router, get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["cached"], false);
    assert_eq!(body["spectrogram_base64"], "png:inferno");

    let (_, body) = send(&app.router, get(&uri)).await;
    assert_eq!(body["cached"], true);
    assert_eq!(app.renderer.calls(), 1);

    let (status, body) = send(&app.router, delete("/cache")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cleared"], 1);

    let (_, body) = send(&app.router, get("/health")).await;
    assert_eq!(body["cache_size"], 0);
}

#[tokio::test]
async fn test_single_clip_errors() {
    let app = test_app();

    let (status, body) = send(&app.router, get("/clip?start_time=0&end_time=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].as_str().unwrap().contains("file_path"));

    let (status, _) = send(&app.router, get("/clip?file_path=/nonexistent/a.wav&start_time=0&end_time=1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app.router, get("/clip?file_path=/a.wav&start_time=soon&end_time=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
