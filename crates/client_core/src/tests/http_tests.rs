use super::*;

use axum::{
    extract::Multipart,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::broadcast};

async fn spawn_backend(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn upload_handler(mut multipart: Multipart) -> Json<Value> {
    let mut filename = None;
    let mut received = 0;
    while let Some(field) = multipart.next_field().await.expect("field") {
        if field.name() == Some("video") {
            filename = field.file_name().map(|name| name.to_string());
            received = field.bytes().await.expect("bytes").len();
        }
    }
    match filename {
        Some(filename) if received > 0 => Json(json!({
            "message": "File uploaded successfully",
            "filepath": filename,
        })),
        _ => Json(json!({ "error": "No file part" })),
    }
}

async fn rejecting_upload_handler() -> (StatusCode, Json<Value>) {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad format" })))
}

#[tokio::test]
async fn upload_submitter_posts_multipart_and_parses_filepath() {
    let base = spawn_backend(Router::new().route("/upload", post(upload_handler))).await;

    let submitter = HttpUploadSubmitter::new(base);
    let handle = submitter
        .submit(VideoUpload {
            filename: "clip.mp4".to_string(),
            bytes: b"0123456789".to_vec(),
            mime_type: Some("video/mp4".to_string()),
        })
        .await
        .expect("submit");

    assert_eq!(handle, FileHandle("clip.mp4".to_string()));
}

#[tokio::test]
async fn upload_submitter_surfaces_backend_error_message() {
    let base =
        spawn_backend(Router::new().route("/upload", post(rejecting_upload_handler))).await;

    let submitter = HttpUploadSubmitter::new(base);
    let err = submitter
        .submit(VideoUpload {
            filename: "clip.txt".to_string(),
            bytes: b"nope".to_vec(),
            mime_type: None,
        })
        .await
        .expect_err("should fail");

    assert_eq!(err, UploadError::backend("bad format"));
    assert_eq!(err.to_string(), "bad format");
}

#[tokio::test]
async fn upload_submitter_maps_transport_failure_to_generic_message() {
    let submitter = HttpUploadSubmitter::new("http://127.0.0.1:9");
    let err = submitter
        .submit(VideoUpload {
            filename: "clip.mp4".to_string(),
            bytes: b"0123".to_vec(),
            mime_type: None,
        })
        .await
        .expect_err("should fail");

    assert!(matches!(err, UploadError::Network { .. }));
    assert_eq!(err.to_string(), "Upload failed.");
}

#[tokio::test]
async fn counter_source_parses_flat_stats_object() {
    let app = Router::new().route(
        "/stats",
        get(|| async {
            Json(json!({
                "signal": 3,
                "helmet": 1,
                "triple": 0,
                "traffic_helmet": 2,
                "multiple": 1,
            }))
        }),
    );
    let base = spawn_backend(app).await;

    let source = HttpCounterSource::new(base);
    let snapshot = source.fetch().await.expect("fetch");
    assert_eq!(
        snapshot,
        CounterSnapshot {
            signal: 3,
            helmet: 1,
            triple: 0,
            traffic_helmet: 2,
            multiple: 1,
        }
    );
}

#[tokio::test]
async fn counter_source_maps_server_error_to_poll_error() {
    let app = Router::new().route(
        "/stats",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
    );
    let base = spawn_backend(app).await;

    let source = HttpCounterSource::new(base);
    let err = source.fetch().await.expect_err("should fail");
    assert!(matches!(err, PollError::Http(_)));
}

struct NullBinding {
    signals: broadcast::Sender<display_integration::SurfaceSignal>,
}

impl SurfaceBinding for NullBinding {
    fn clear(&self) {}

    fn subscribe_signals(
        &self,
    ) -> broadcast::Receiver<display_integration::SurfaceSignal> {
        self.signals.subscribe()
    }
}

struct CapturingSurface {
    seen: tokio::sync::Mutex<Vec<SurfaceBindOptions>>,
}

#[async_trait]
impl DisplaySurface for CapturingSurface {
    async fn bind(
        &self,
        options: SurfaceBindOptions,
    ) -> anyhow::Result<Arc<dyn SurfaceBinding>> {
        self.seen.lock().await.push(options);
        Ok(Arc::new(NullBinding {
            signals: broadcast::channel(8).0,
        }))
    }
}

#[tokio::test]
async fn stream_binder_builds_feed_url_with_path_and_nonce() {
    let surface = Arc::new(CapturingSurface {
        seen: tokio::sync::Mutex::new(Vec::new()),
    });
    let binder = HttpStreamBinder::new(
        "http://127.0.0.1:5000",
        Arc::clone(&surface) as Arc<dyn DisplaySurface>,
    );

    binder
        .attach(&FileHandle("my clip.mp4".to_string()))
        .await
        .expect("attach");

    let seen = surface.seen.lock().await;
    assert_eq!(seen.len(), 1);
    let url = Url::parse(&seen[0].feed_url).expect("url");
    assert_eq!(url.path(), "/video_feed");

    let mut path_param = None;
    let mut nonce = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "path" => path_param = Some(value.to_string()),
            "t" => nonce = Some(value.to_string()),
            other => panic!("unexpected query parameter {other}"),
        }
    }
    assert_eq!(path_param.as_deref(), Some("my clip.mp4"));
    let nonce: i64 = nonce.expect("nonce present").parse().expect("numeric nonce");
    assert!(nonce > 0);
}
