use async_trait::async_trait;
use tokio::sync::broadcast;

mod mjpeg;

pub use mjpeg::MjpegSurface;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceBindOptions {
    pub feed_url: String,
}

/// Terminal signals a bound surface reports back: the first displayable
/// frame arrived, or the feed failed/ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceSignal {
    Connected,
    Disconnected,
}

pub trait SurfaceBinding: Send + Sync {
    /// Detach the surface from its feed. Idempotent; no signals are emitted
    /// after the first call returns.
    fn clear(&self);
    fn subscribe_signals(&self) -> broadcast::Receiver<SurfaceSignal>;
}

#[async_trait]
pub trait DisplaySurface: Send + Sync {
    async fn bind(
        &self,
        options: SurfaceBindOptions,
    ) -> anyhow::Result<std::sync::Arc<dyn SurfaceBinding>>;
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
