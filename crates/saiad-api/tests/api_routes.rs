//! Router-level tests against the in-memory backend.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use saiad_api::{create_router, ApiConfig, AppState};
use saiad_models::{
    AspectRatio, ExportProfile, ExportVariant, JobId, JobOutcome, JobStatus, StageName,
    StageUpdate, VideoArtifact,
};
use saiad_queue::{BackendKind, Backends, QueueConfig};
use saiad_storage::{ArtifactStore, LocalArtifactStore, LocalStoreConfig};

struct TestApp {
    router: Router,
    backends: Backends,
    storage: Arc<dyn ArtifactStore>,
    _dir: tempfile::TempDir,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let backends = Backends::connect(BackendKind::Memory, &QueueConfig::default())
        .await
        .unwrap();
    let storage: Arc<dyn ArtifactStore> = Arc::new(
        LocalArtifactStore::new(LocalStoreConfig {
            root: dir.path().join("artifacts"),
            public_base_url: Some("http://cdn.test".to_string()),
        })
        .await
        .unwrap(),
    );
    let state = AppState::new(ApiConfig::default(), &backends, storage.clone());
    TestApp {
        router: create_router(state, None),
        backends,
        storage,
        _dir: dir,
    }
}

fn generate_body(durations: &[f64]) -> Value {
    let scenes: Vec<Value> = durations
        .iter()
        .enumerate()
        .map(|(i, d)| json!({ "index": i + 1, "duration_secs": d }))
        .collect();
    json!({
        "project_id": "proj-1",
        "config": {
            "product": { "id": "galaxy-s25-ultra" },
            "target_duration_secs": 30.0,
            "aspect_ratio": "16:9"
        },
        "storyboard": { "scenes": scenes }
    })
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_json(uri: &str, body: &Value, idempotency_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = idempotency_key {
        builder = builder.header("Idempotency-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn submit(app: &TestApp, key: &str) -> String {
    let (status, body) = send(
        &app.router,
        post_json("/api/v1/videos/generate", &generate_body(&[5.0, 10.0, 10.0, 5.0]), Some(key)),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    body["job_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_generate_accepts_and_estimates() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json("/api/v1/videos/generate", &generate_body(&[5.0, 10.0, 10.0, 5.0]), None),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["estimated_time_secs"], 180);
    assert!(body["job_id"].as_str().is_some());
}

#[tokio::test]
async fn test_repeated_idempotency_key_returns_same_job() {
    let app = test_app().await;
    let first = submit(&app, "idem-42").await;
    let second = submit(&app, "idem-42").await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_generate_rejects_duration_mismatch() {
    let app = test_app().await;
    let (status, body) = send(
        &app.router,
        post_json("/api/v1/videos/generate", &generate_body(&[5.0, 10.0, 10.0, 4.9]), None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationError");
}

#[tokio::test]
async fn test_generate_rejects_malformed_json() {
    let app = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/videos/generate")
        .header("content-type", "application/json")
        .body(Body::from("{\"project_id\":"))
        .unwrap();
    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "ValidationError");
}

#[tokio::test]
async fn test_status_reports_stage_breakdown() {
    let app = test_app().await;
    let job_id = submit(&app, "status-1").await;

    let (status, body) = send(&app.router, get(&format!("/api/v1/videos/{}/status", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["progress"], 0);
    assert_eq!(body["estimated_remaining_secs"], 180);
    assert_eq!(body["is_stale"], false);

    let stages = body["stages"].as_array().unwrap();
    assert_eq!(stages.len(), 5);
    assert_eq!(stages[0]["stage"], "script_processing");
    assert_eq!(stages[0]["weight"], 5);
    assert_eq!(stages[2]["weight"], 45);
}

#[tokio::test]
async fn test_status_unknown_job_is_404() {
    let app = test_app().await;
    let (status, _) = send(&app.router, get("/api/v1/videos/nope/status")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cancel_queued_job_then_conflict() {
    let app = test_app().await;
    let job_id = submit(&app, "cancel-1").await;
    let uri = format!("/api/v1/videos/{}/cancel", job_id);

    let (status, body) = send(&app.router, post_json(&uri, &Value::Null, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled"], true);
    assert_eq!(body["status"], "failed");

    let job = app
        .backends
        .tracker
        .get_status(&JobId::from_string(job_id.clone()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure.unwrap().code.to_string(), "Cancelled");

    let (status, _) = send(&app.router, post_json(&uri, &Value::Null, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_download_before_completion_is_conflict() {
    let app = test_app().await;
    let job_id = submit(&app, "dl-1").await;
    let (status, _) = send(&app.router, get(&format!("/api/v1/videos/{}/download", job_id))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

async fn complete_job(app: &TestApp, job_id: &str) {
    complete_job_as(app, job_id, AspectRatio::LANDSCAPE, ExportProfile::Youtube).await;
}

/// Finish a job with a master in `aspect` and a single `profile` variant.
async fn complete_job_as(app: &TestApp, job_id: &str, aspect: AspectRatio, profile: ExportProfile) {
    let id = JobId::from_string(job_id);
    let tracker = &app.backends.tracker;
    tracker.start(&id).await.unwrap();
    for stage in StageName::ALL {
        tracker.update_stage(&id, StageUpdate::started(stage)).await.unwrap();
        tracker
            .update_stage(&id, StageUpdate::completed(stage, Vec::new()))
            .await
            .unwrap();
    }

    let master = app
        .storage
        .put_bytes(&format!("jobs/{}/final.mp4", job_id), b"master".to_vec(), "video/mp4")
        .await
        .unwrap();
    let export = app
        .storage
        .put_bytes(
            &format!("jobs/{}/exports/{}.mp4", job_id, profile),
            b"ex".to_vec(),
            "video/mp4",
        )
        .await
        .unwrap();
    let spec = profile.spec();
    let (width, height) = match ExportProfile::default_for(aspect) {
        Some(default) => (default.spec().width, default.spec().height),
        None => (spec.width, spec.height),
    };
    let artifact = VideoArtifact {
        master,
        duration_secs: 30.0,
        width,
        height,
        aspect_ratio: aspect,
        file_size: 6,
        render_time_secs: 1.0,
        thumbnail: None,
        variants: vec![ExportVariant {
            profile,
            aspect_ratio: spec.aspect_ratio,
            width: spec.width,
            height: spec.height,
            duration_secs: 30.0,
            file_size: 2,
            artifact: export,
        }],
    };
    tracker
        .finalize(&id, JobOutcome::Completed(artifact))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_download_completed_job_variants() {
    let app = test_app().await;
    let job_id = submit(&app, "dl-2").await;
    complete_job(&app, &job_id).await;

    let (status, body) = send(&app.router, get(&format!("/api/v1/videos/{}/download", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "youtube");
    assert_eq!(body["expires_in_secs"], 3600);
    assert!(body["url"]
        .as_str()
        .unwrap()
        .starts_with(&format!("http://cdn.test/jobs/{}/exports/youtube.mp4", job_id)));

    let (status, body) = send(
        &app.router,
        get(&format!("/api/v1/videos/{}/download?format=master", job_id)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "master");

    let (status, _) = send(
        &app.router,
        get(&format!("/api/v1/videos/{}/download?format=tiktok", job_id)),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app.router,
        get(&format!("/api/v1/videos/{}/download?format=betamax", job_id)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app.router, get(&format!("/api/v1/videos/{}/status", job_id))).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["estimated_remaining_secs"], 0);
}

#[tokio::test]
async fn test_download_defaults_to_variant_for_master_aspect() {
    let app = test_app().await;
    let job_id = submit(&app, "dl-portrait").await;
    complete_job_as(&app, &job_id, AspectRatio::PORTRAIT, ExportProfile::Tiktok).await;

    let (status, body) = send(&app.router, get(&format!("/api/v1/videos/{}/download", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "tiktok");
    assert!(body["url"]
        .as_str()
        .unwrap()
        .starts_with(&format!("http://cdn.test/jobs/{}/exports/tiktok.mp4", job_id)));

    // No variant in the master's shape: fall back to the master itself.
    let job_id = submit(&app, "dl-square").await;
    complete_job_as(&app, &job_id, AspectRatio::SQUARE, ExportProfile::Youtube).await;
    let (status, body) = send(&app.router, get(&format!("/api/v1/videos/{}/download", job_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["format"], "master");
}

#[tokio::test]
async fn test_health_and_ready() {
    let app = test_app().await;
    let (status, body) = send(&app.router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send(&app.router, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = test_app().await;
    let response = app.router.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("x-request-id"));
}
