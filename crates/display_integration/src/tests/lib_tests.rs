use super::*;

use std::{sync::Arc, time::Duration};

use axum::{
    body::{Body, Bytes},
    routing::get,
    Router,
};
use futures::{stream, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::TryRecvError;

async fn spawn_feed_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn finite_feed() -> Body {
    Body::from_stream(stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"--frame\r\n")),
        Ok::<_, std::io::Error>(Bytes::from_static(b"\xff\xd8\xff")),
    ]))
}

async fn endless_feed() -> Body {
    let first = stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
        b"--frame\r\n",
    ))]);
    Body::from_stream(first.chain(stream::pending()))
}

#[tokio::test]
async fn emits_connected_then_disconnected_for_finite_feed() {
    let app = Router::new().route("/video_feed", get(finite_feed));
    let base = spawn_feed_server(app).await;

    let surface = MjpegSurface::new();
    let binding = surface
        .bind(SurfaceBindOptions {
            feed_url: format!("{base}/video_feed"),
        })
        .await
        .expect("bind");

    let mut signals = binding.subscribe_signals();
    assert_eq!(signals.recv().await, Ok(SurfaceSignal::Connected));
    assert_eq!(signals.recv().await, Ok(SurfaceSignal::Disconnected));
}

#[tokio::test]
async fn clear_silences_signals_and_is_idempotent() {
    let app = Router::new().route("/video_feed", get(endless_feed));
    let base = spawn_feed_server(app).await;

    let surface = MjpegSurface::new();
    let binding = surface
        .bind(SurfaceBindOptions {
            feed_url: format!("{base}/video_feed"),
        })
        .await
        .expect("bind");

    let mut signals = binding.subscribe_signals();
    assert_eq!(signals.recv().await, Ok(SurfaceSignal::Connected));

    binding.clear();
    binding.clear();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(signals.try_recv(), Err(TryRecvError::Empty));
}

#[tokio::test]
async fn bind_fails_for_unreachable_feed() {
    let surface = MjpegSurface::new();
    let result = surface
        .bind(SurfaceBindOptions {
            feed_url: "http://127.0.0.1:9/video_feed".to_string(),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn bind_fails_for_missing_feed_path() {
    let app = Router::new().route("/video_feed", get(finite_feed));
    let base = spawn_feed_server(app).await;

    let surface = MjpegSurface::new();
    let result = surface
        .bind(SurfaceBindOptions {
            feed_url: format!("{base}/missing"),
        })
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn subscribers_attached_after_clear_see_no_signals() {
    let app = Router::new().route("/video_feed", get(endless_feed));
    let base = spawn_feed_server(app).await;

    let surface = MjpegSurface::new();
    let binding: Arc<dyn SurfaceBinding> = surface
        .bind(SurfaceBindOptions {
            feed_url: format!("{base}/video_feed"),
        })
        .await
        .expect("bind");

    binding.clear();
    let mut late = binding.subscribe_signals();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
}
