use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use async_trait::async_trait;
use display_integration::{SurfaceBinding, SurfaceSignal};
use shared::{
    domain::{FileHandle, LogEntry, LogSeverity, SessionId, SessionState},
    error::{PollError, UploadError},
    protocol::CounterSnapshot,
};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub mod http;

pub use http::{HttpCounterSource, HttpStreamBinder, HttpUploadSubmitter};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_RECOVERY_DELAY: Duration = Duration::from_millis(2000);

const LOG_SOURCE_SYSTEM: &str = "System";
const LOG_SOURCE_ERROR: &str = "Error";

/// A file selected for analysis, as handed over by UI glue.
#[derive(Debug, Clone)]
pub struct VideoUpload {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[async_trait]
pub trait UploadSubmitter: Send + Sync {
    async fn submit(&self, upload: VideoUpload) -> Result<FileHandle, UploadError>;
}

pub struct MissingUploadSubmitter;

#[async_trait]
impl UploadSubmitter for MissingUploadSubmitter {
    async fn submit(&self, _upload: VideoUpload) -> Result<FileHandle, UploadError> {
        Err(UploadError::network("no upload backend configured"))
    }
}

#[async_trait]
pub trait StreamBinder: Send + Sync {
    async fn attach(&self, handle: &FileHandle) -> anyhow::Result<Arc<dyn SurfaceBinding>>;
}

pub struct MissingStreamBinder;

#[async_trait]
impl StreamBinder for MissingStreamBinder {
    async fn attach(&self, handle: &FileHandle) -> anyhow::Result<Arc<dyn SurfaceBinding>> {
        Err(anyhow!("no display surface configured for {}", handle.0))
    }
}

#[async_trait]
pub trait CounterSource: Send + Sync {
    async fn fetch(&self) -> Result<CounterSnapshot, PollError>;
}

pub struct MissingCounterSource;

#[async_trait]
impl CounterSource for MissingCounterSource {
    async fn fetch(&self) -> Result<CounterSnapshot, PollError> {
        Err(PollError::Http("no stats backend configured".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(SessionState),
    CountersUpdated(CounterSnapshot),
    Log(LogEntry),
}

/// Timer cadences of a session. Tests shorten these; the defaults match the
/// production UI (500 ms counter polling, 2 s post-disconnect linger).
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub poll_interval: Duration,
    pub recovery_delay: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            recovery_delay: DEFAULT_RECOVERY_DELAY,
        }
    }
}

struct ActiveSession {
    session_id: SessionId,
    file_handle: FileHandle,
    binding: Arc<dyn SurfaceBinding>,
    signal_task: JoinHandle<()>,
    poll_task: Option<JoinHandle<()>>,
    recovery_timer: Option<JoinHandle<()>>,
}

struct SessionSlot {
    state: SessionState,
    // Bumped on every teardown; callbacks holding an older generation are
    // from a superseded session and must not mutate the slot.
    generation: u64,
    active: Option<ActiveSession>,
}

/// Session controller for the monitoring client. Owns the
/// Idle/Uploading/Streaming/Recovering state machine and sequences the
/// upload, stream-attach, and counter-poll collaborators so that teardown is
/// complete before any new setup begins.
///
/// `submit_file` and `cancel_session` are the only entry points UI glue may
/// call; every outcome is reported through the event channel.
pub struct MonitorClient {
    upload: Arc<dyn UploadSubmitter>,
    binder: Arc<dyn StreamBinder>,
    counters: Arc<dyn CounterSource>,
    timing: SessionTiming,
    inner: Mutex<SessionSlot>,
    events: broadcast::Sender<ClientEvent>,
}

impl MonitorClient {
    pub fn new() -> Arc<Self> {
        Self::new_with_dependencies(
            Arc::new(MissingUploadSubmitter),
            Arc::new(MissingStreamBinder),
            Arc::new(MissingCounterSource),
        )
    }

    pub fn new_with_dependencies(
        upload: Arc<dyn UploadSubmitter>,
        binder: Arc<dyn StreamBinder>,
        counters: Arc<dyn CounterSource>,
    ) -> Arc<Self> {
        Self::new_with_timing(upload, binder, counters, SessionTiming::default())
    }

    pub fn new_with_timing(
        upload: Arc<dyn UploadSubmitter>,
        binder: Arc<dyn StreamBinder>,
        counters: Arc<dyn CounterSource>,
        timing: SessionTiming,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            upload,
            binder,
            counters,
            timing,
            inner: Mutex::new(SessionSlot {
                state: SessionState::Idle,
                generation: 0,
                active: None,
            }),
            events,
        })
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn current_state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Start a new monitoring session for `upload`. Any session already in
    /// flight is torn down first, so at most one poller and one stream
    /// binding ever exist.
    pub async fn submit_file(self: &Arc<Self>, upload: VideoUpload) {
        let filename = upload.filename.clone();
        let generation = {
            let mut slot = self.inner.lock().await;
            self.teardown_locked(&mut slot);
            slot.state = SessionState::Uploading;
            slot.generation
        };

        info!(filename = %filename, "submitting video for analysis");
        self.log(
            LOG_SOURCE_SYSTEM,
            format!("Uploading {filename}..."),
            LogSeverity::Info,
        );
        self.publish_state(SessionState::Uploading);

        match self.upload.submit(upload).await {
            Ok(handle) => self.begin_streaming(generation, handle).await,
            Err(err) => {
                {
                    let mut slot = self.inner.lock().await;
                    if slot.generation != generation || slot.state != SessionState::Uploading {
                        debug!("discarding upload failure from superseded session");
                        return;
                    }
                    slot.state = SessionState::Idle;
                }
                if let UploadError::Network { detail } = &err {
                    warn!(detail = %detail, "upload transport failure");
                }
                self.log(LOG_SOURCE_ERROR, err.to_string(), LogSeverity::Danger);
                self.publish_state(SessionState::Idle);
            }
        }
    }

    /// Stop the current session, whatever phase it is in. A no-op while
    /// Idle. Neutralizes the poller, the stream binding, and any pending
    /// recovery timer before returning.
    pub async fn cancel_session(&self) {
        {
            let mut slot = self.inner.lock().await;
            if slot.state == SessionState::Idle {
                return;
            }
            self.teardown_locked(&mut slot);
        }

        info!("session cancelled by user");
        self.log(
            LOG_SOURCE_SYSTEM,
            "Stopped analysis.",
            LogSeverity::Warning,
        );
        self.publish_state(SessionState::Idle);
    }

    async fn begin_streaming(self: &Arc<Self>, generation: u64, handle: FileHandle) {
        {
            let slot = self.inner.lock().await;
            if slot.generation != generation || slot.state != SessionState::Uploading {
                debug!("discarding upload success from superseded session");
                return;
            }
        }

        self.log(
            LOG_SOURCE_SYSTEM,
            "Upload successful. Starting analysis...",
            LogSeverity::Success,
        );

        let binding = match self.binder.attach(&handle).await {
            Ok(binding) => binding,
            Err(err) => {
                {
                    let mut slot = self.inner.lock().await;
                    if slot.generation != generation || slot.state != SessionState::Uploading {
                        return;
                    }
                    slot.state = SessionState::Idle;
                }
                warn!(handle = %handle.0, "stream attach failed: {err}");
                self.log(
                    LOG_SOURCE_ERROR,
                    format!("Stream unavailable: {err}"),
                    LogSeverity::Danger,
                );
                self.publish_state(SessionState::Idle);
                return;
            }
        };

        let mut slot = self.inner.lock().await;
        if slot.generation != generation || slot.state != SessionState::Uploading {
            // Superseded while attaching; the binding we just created must
            // not outlive its session.
            binding.clear();
            return;
        }

        let session_id = SessionId::new();
        // Spawned tasks contend on the session lock, so neither can observe
        // the slot before the active session is stored below.
        let signal_task = self.spawn_signal_task(generation, binding.subscribe_signals());
        let poll_task = self.spawn_poll_task(generation);

        info!(session = %session_id.0, handle = %handle.0, "stream attached, polling started");
        slot.state = SessionState::Streaming;
        slot.active = Some(ActiveSession {
            session_id,
            file_handle: handle,
            binding,
            signal_task,
            poll_task: Some(poll_task),
            recovery_timer: None,
        });
        drop(slot);

        self.publish_state(SessionState::Streaming);
    }

    fn spawn_signal_task(
        self: &Arc<Self>,
        generation: u64,
        mut signals: broadcast::Receiver<SurfaceSignal>,
    ) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match signals.recv().await {
                    Ok(SurfaceSignal::Connected) => {
                        client.handle_stream_connected(generation).await;
                    }
                    Ok(SurfaceSignal::Disconnected) => {
                        client.handle_stream_disconnected(generation).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_poll_task(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let source = Arc::clone(&self.counters);
        let period = self.timing.poll_interval;
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                ticker.tick().await;
                match source.fetch().await {
                    Ok(snapshot) => {
                        // Publish under the lock with no await in between, so
                        // a stopped poller can never emit a late snapshot.
                        let slot = client.inner.lock().await;
                        if slot.generation != generation
                            || slot.state != SessionState::Streaming
                        {
                            break;
                        }
                        let _ = client.events.send(ClientEvent::CountersUpdated(snapshot));
                    }
                    Err(err) => {
                        warn!("counter poll failed: {err}");
                    }
                }
            }
        })
    }

    async fn handle_stream_connected(&self, generation: u64) {
        {
            let slot = self.inner.lock().await;
            if slot.generation != generation || slot.state != SessionState::Streaming {
                // Includes a reconnect during Recovering: ignored, the
                // pending revert stands.
                return;
            }
        }
        self.log(
            LOG_SOURCE_SYSTEM,
            "Live stream active.",
            LogSeverity::Success,
        );
    }

    async fn handle_stream_disconnected(self: &Arc<Self>, generation: u64) {
        {
            let mut slot = self.inner.lock().await;
            if slot.generation != generation || slot.state != SessionState::Streaming {
                return;
            }
            if let Some(active) = slot.active.as_mut() {
                if let Some(poll) = active.poll_task.take() {
                    poll.abort();
                }
                active.recovery_timer = Some(self.spawn_recovery_timer(generation));
                info!(session = %active.session_id.0, "stream disconnected, polling stopped");
            }
            slot.state = SessionState::Recovering;
        }

        self.log(LOG_SOURCE_ERROR, "Stream disconnected.", LogSeverity::Danger);
        self.publish_state(SessionState::Recovering);
    }

    fn spawn_recovery_timer(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let client = Arc::clone(self);
        let delay = self.timing.recovery_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut slot = client.inner.lock().await;
                if slot.generation != generation || slot.state != SessionState::Recovering {
                    return;
                }
                if let Some(active) = slot.active.take() {
                    if let Some(poll) = active.poll_task {
                        poll.abort();
                    }
                    active.signal_task.abort();
                    active.binding.clear();
                }
                slot.generation += 1;
                slot.state = SessionState::Idle;
            }

            debug!("recovery delay elapsed, session returned to idle");
            client.publish_state(SessionState::Idle);
        })
    }

    /// Release everything the current session owns: poller, recovery timer,
    /// signal forwarding, and the stream binding. Runs synchronously under
    /// the session lock so no new setup can interleave with it, and bumps
    /// the generation so in-flight callbacks of the old session become
    /// no-ops.
    fn teardown_locked(&self, slot: &mut SessionSlot) {
        slot.generation += 1;
        if let Some(active) = slot.active.take() {
            if let Some(poll) = active.poll_task {
                poll.abort();
            }
            if let Some(timer) = active.recovery_timer {
                timer.abort();
            }
            active.signal_task.abort();
            active.binding.clear();
            debug!(session = %active.session_id.0, handle = %active.file_handle.0, "session torn down");
        }
        slot.state = SessionState::Idle;
    }

    fn publish_state(&self, state: SessionState) {
        let _ = self.events.send(ClientEvent::StateChanged(state));
    }

    fn log(&self, source: &str, message: impl Into<String>, severity: LogSeverity) {
        let _ = self
            .events
            .send(ClientEvent::Log(LogEntry::new(source, message, severity)));
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
