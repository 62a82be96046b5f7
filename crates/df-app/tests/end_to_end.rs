use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use axum::Router;
use axum::extract::{Multipart, Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use serde_json::{Value, json};
use df_app::app::App;
use df_app::backend::GenBackend;
use df_app::config::Config;
use df_app::events::UiEvent;
use df_app::loader::LOAD_FAILED;
use df_app::state::DownloadState;
use df_app::viewport::renderer::HeadlessRenderer;
use df_core::JobStatus;
use df_core::machine::{PROCESSING_FAILED, UPLOAD_FAILED};

const JOB_ID: &str = "abc123";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A unit cube as a single-mesh binary glTF.
fn cube_glb() -> Vec<u8> {
    let positions: Vec<[f32; 3]> = (0..8)
        .map(|i| [(i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32])
        .collect();
    let bin: &[u8] = bytemuck::cast_slice(&positions);

    let doc = json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0, "translation": [4.0, 0.0, -2.0] }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 8,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 1.0]
        }],
        "bufferViews": [{ "buffer": 0, "byteLength": bin.len() }],
        "buffers": [{ "byteLength": bin.len() }]
    });

    let mut json_chunk = serde_json::to_vec(&doc).unwrap();
    while json_chunk.len() % 4 != 0 {
        json_chunk.push(b' ');
    }
    let mut bin_chunk = bin.to_vec();
    while bin_chunk.len() % 4 != 0 {
        bin_chunk.push(0);
    }

    let total = 12 + 8 + json_chunk.len() + 8 + bin_chunk.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json_chunk);
    glb.extend_from_slice(&(bin_chunk.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin_chunk);
    glb
}

#[derive(Clone)]
struct FakeBackend {
    accept_uploads: bool,
    uploads: Arc<AtomicUsize>,
    status_calls: Arc<AtomicUsize>,
    /// Replayed in order; the last entry repeats.
    script: Arc<Vec<Value>>,
    glb: Arc<Vec<u8>>,
}

impl FakeBackend {
    fn new(script: Vec<Value>) -> Self {
        Self {
            accept_uploads: true,
            uploads: Arc::new(AtomicUsize::new(0)),
            status_calls: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(script),
            glb: Arc::new(cube_glb()),
        }
    }

    async fn serve(&self) -> String {
        let router = Router::new()
            .route("/upload", post(upload))
            .route("/status/{job_id}", get(status))
            .route("/result/{job_id}", get(result))
            .with_state(self.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

async fn upload(State(backend): State<FakeBackend>, mut multipart: Multipart) -> impl IntoResponse {
    let mut saw_file = false;
    while let Some(field) = multipart.next_field().await.unwrap() {
        if field.name() == Some("file") {
            assert_eq!(field.file_name(), Some("cat.png"));
            assert_eq!(field.content_type(), Some("image/png"));
            saw_file = !field.bytes().await.unwrap().is_empty();
        }
    }
    backend.uploads.fetch_add(1, Ordering::SeqCst);

    if !backend.accept_uploads || !saw_file {
        return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(json!({ "detail": "boom" })));
    }
    (StatusCode::OK, axum::Json(json!({ "job_id": JOB_ID })))
}

async fn status(State(backend): State<FakeBackend>, Path(job_id): Path<String>) -> axum::Json<Value> {
    assert_eq!(job_id, JOB_ID);
    let n = backend.status_calls.fetch_add(1, Ordering::SeqCst);
    let update = backend.script.get(n).or(backend.script.last()).cloned().unwrap_or(Value::Null);
    axum::Json(update)
}

async fn result(State(backend): State<FakeBackend>, Path(job_id): Path<String>) -> impl IntoResponse {
    assert_eq!(job_id, JOB_ID);
    ([(header::CONTENT_TYPE, "model/gltf-binary")], backend.glb.as_ref().clone())
}

fn temp_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("depthforge-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn app_for(base_url: &str, dir: &std::path::Path) -> App {
    let config = Config {
        backend_url: base_url.to_string(),
        poll_interval: Duration::from_millis(20),
        poll_timeout: None,
        output_dir: dir.join("outputs"),
        viewport_width: 320,
        viewport_height: 240,
    };
    let api = Arc::new(GenBackend::new(base_url));
    App::new(config, api, Box::new(HeadlessRenderer::boxed))
}

fn select_and_convert(app: &App, dir: &std::path::Path) {
    let image = dir.join("cat.png");
    std::fs::write(&image, b"\x89PNG\r\n\x1a\nnot really pixels").unwrap();

    let proxy = app.proxy();
    proxy.send_ui(UiEvent::SelectFile(image));
    proxy.send_ui(UiEvent::Convert);
}

async fn settle(app: &mut App) {
    tokio::time::timeout(Duration::from_secs(10), app.run_until(|s| s.is_settled()))
        .await
        .expect("job never settled");
}

#[tokio::test]
async fn test_image_becomes_model_and_download() {
    init_logging();
    let backend = FakeBackend::new(vec![
        json!({ "status": "processing", "step": "Estimating depth", "message": "Running depth model" }),
        json!({ "status": "complete" }),
    ]);
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);

    tokio::time::timeout(
        Duration::from_secs(10),
        app.run_until(|s| s.job.progress.step.as_deref() == Some("Estimating depth")),
    )
    .await
    .expect("never saw progress");
    assert_eq!(app.state.job.status, JobStatus::Processing);
    assert_eq!(app.state.job.progress.message, "Running depth model");

    settle(&mut app).await;

    let state = &app.state;
    assert_eq!(state.job.status, JobStatus::Complete);
    assert_eq!(state.job.result_url.as_deref(), Some(format!("{}/result/{}", base, JOB_ID).as_str()));
    assert!(state.asset_error.is_none());
    assert!(!state.is_polling());

    let viewport = state.viewport().expect("viewport active");
    assert_eq!(viewport.model_count(), 1);
    let bounds = viewport.resident_model().unwrap().normalized_bounds().unwrap();
    assert!(bounds.center().length() < 1e-4);
    assert!((bounds.max_dimension() - df_core::TARGET_SIZE).abs() < 1e-4);

    app.proxy().send_ui(UiEvent::Download);
    tokio::time::timeout(
        Duration::from_secs(10),
        app.run_until(|s| matches!(s.download, DownloadState::Saved(_) | DownloadState::Failed(_))),
    )
    .await
    .expect("download never finished");

    let DownloadState::Saved(path) = &app.state.download else {
        panic!("download failed: {:?}", app.state.download);
    };
    assert_eq!(path.file_name().unwrap(), "model.glb");
    assert_eq!(std::fs::read(path).unwrap(), cube_glb());

    // polling stopped at the terminal status
    let calls = backend.status_calls.load(Ordering::SeqCst);
    assert_eq!(calls, 2);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), calls);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 1);

    app.proxy().send_ui(UiEvent::Shutdown);
    app.run().await;
    assert!(!app.is_running());
}

#[tokio::test]
async fn test_second_conversion_leaves_one_model() {
    init_logging();
    let backend = FakeBackend::new(vec![json!({ "status": "complete" })]);
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    settle(&mut app).await;
    assert_eq!(app.state.viewport().unwrap().model_count(), 1);

    app.proxy().send_ui(UiEvent::Convert);
    tokio::time::timeout(Duration::from_secs(10), app.run_until(|s| s.job.status != JobStatus::Complete))
        .await
        .expect("second conversion never started");
    assert!(app.state.viewport().is_none());
    assert_eq!(app.state.host.resize_listener_count(), 0);

    settle(&mut app).await;
    assert_eq!(app.state.viewport().unwrap().model_count(), 1);
    assert_eq!(app.state.host.resize_listener_count(), 1);
    assert_eq!(backend.uploads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_backend_error_is_surfaced() {
    init_logging();
    let backend = FakeBackend::new(vec![json!({ "status": "error", "error": "X" })]);
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    settle(&mut app).await;

    assert_eq!(app.state.job.status, JobStatus::Error);
    assert_eq!(app.state.job.error.as_deref(), Some("X"));
    assert!(app.state.viewport().is_none());
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_backend_error_without_detail_uses_default() {
    init_logging();
    let backend = FakeBackend::new(vec![json!({ "status": "error" })]);
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    settle(&mut app).await;

    assert_eq!(app.state.job.error.as_deref(), Some(PROCESSING_FAILED));
}

#[tokio::test]
async fn test_rejected_upload_shows_generic_message() {
    init_logging();
    let mut backend = FakeBackend::new(vec![json!({ "status": "complete" })]);
    backend.accept_uploads = false;
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    settle(&mut app).await;

    assert_eq!(app.state.job.status, JobStatus::Error);
    assert_eq!(app.state.job.error.as_deref(), Some(UPLOAD_FAILED));
    assert_eq!(backend.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unparseable_asset_fails_load() {
    init_logging();
    let mut backend = FakeBackend::new(vec![json!({ "status": "complete" })]);
    backend.glb = Arc::new(b"not a model".to_vec());
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    settle(&mut app).await;

    assert_eq!(app.state.job.status, JobStatus::Complete);
    assert_eq!(app.state.asset_error.as_deref(), Some(LOAD_FAILED));
    assert_eq!(app.state.viewport().unwrap().model_count(), 0);
}

/// Drives the app the way the window loop does: drain queued events, then
/// draw a frame, with no `run_until`.
#[tokio::test]
async fn test_pumped_loop_reaches_model_and_follows_resize() {
    init_logging();
    let backend = FakeBackend::new(vec![json!({ "status": "complete" })]);
    let base = backend.serve().await;
    let dir = temp_dir();
    let mut app = app_for(&base, &dir);

    select_and_convert(&app, &dir);
    let pumped = async {
        while !app.state.is_settled() {
            app.pump();
            app.state.frame();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(10), pumped)
        .await
        .expect("job never settled");
    assert_eq!(app.state.viewport().unwrap().model_count(), 1);

    let proxy = app.proxy();
    proxy.send_ui(UiEvent::Resize { width: 640, height: 200 });
    proxy.send_ui(UiEvent::Orbit { dx: 40.0, dy: 0.0 });
    proxy.send_ui(UiEvent::ResetCamera);
    assert_eq!(app.pump(), 3);
    app.state.frame();

    let viewport = app.state.viewport().unwrap();
    assert_eq!(viewport.render_stats().width, 640);
    assert!((viewport.camera.aspect_ratio - 3.2).abs() < 1e-6);

    proxy.send_ui(UiEvent::Shutdown);
    app.pump();
    assert!(!app.is_running());
    assert!(app.state.viewport().is_none());
}
