use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use anyhow::Context;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};

use crate::{DisplaySurface, SurfaceBindOptions, SurfaceBinding, SurfaceSignal};

const SIGNAL_CHANNEL_CAPACITY: usize = 16;

/// Display surface backed by an MJPEG-over-HTTP feed. Binding opens the feed
/// and forwards connect/disconnect signals observed on the byte stream.
pub struct MjpegSurface {
    http: reqwest::Client,
}

impl MjpegSurface {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for MjpegSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DisplaySurface for MjpegSurface {
    async fn bind(
        &self,
        options: SurfaceBindOptions,
    ) -> anyhow::Result<Arc<dyn SurfaceBinding>> {
        let response = self
            .http
            .get(&options.feed_url)
            .send()
            .await
            .with_context(|| format!("failed to open feed {}", options.feed_url))?
            .error_for_status()
            .with_context(|| format!("feed rejected: {}", options.feed_url))?;

        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let cleared = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(forward_feed_signals(
            response,
            signals.clone(),
            Arc::clone(&cleared),
        ));

        Ok(Arc::new(MjpegBinding {
            signals,
            cleared,
            reader: Mutex::new(Some(reader)),
        }))
    }
}

struct MjpegBinding {
    signals: broadcast::Sender<SurfaceSignal>,
    cleared: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceBinding for MjpegBinding {
    fn clear(&self) {
        if self.cleared.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(task) = reader.take() {
                task.abort();
            }
        }
    }

    fn subscribe_signals(&self) -> broadcast::Receiver<SurfaceSignal> {
        self.signals.subscribe()
    }
}

async fn forward_feed_signals(
    response: reqwest::Response,
    signals: broadcast::Sender<SurfaceSignal>,
    cleared: Arc<AtomicBool>,
) {
    let mut chunks = response.bytes_stream();
    let mut connected = false;

    loop {
        match chunks.next().await {
            Some(Ok(chunk)) => {
                if !connected && !chunk.is_empty() {
                    connected = true;
                    if cleared.load(Ordering::SeqCst) {
                        return;
                    }
                    let _ = signals.send(SurfaceSignal::Connected);
                }
            }
            Some(Err(err)) => {
                warn!("feed stream error: {err}");
                break;
            }
            None => {
                debug!("feed stream ended");
                break;
            }
        }
    }

    if !cleared.load(Ordering::SeqCst) {
        let _ = signals.send(SurfaceSignal::Disconnected);
    }
}
