use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use client_core::{
    ClientEvent, HttpCounterSource, HttpStreamBinder, HttpUploadSubmitter, MonitorClient,
    SessionTiming, VideoUpload,
};
use display_integration::MjpegSurface;
use shared::domain::{LogSeverity, SessionState};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

mod config;

#[derive(Parser, Debug)]
struct Args {
    /// Video file to submit for analysis.
    #[arg(long)]
    video: PathBuf,
    /// Analysis backend base URL; overrides roadwatch.toml and environment.
    #[arg(long)]
    server_url: Option<String>,
    #[arg(long)]
    poll_interval_ms: Option<u64>,
    #[arg(long)]
    recovery_delay_ms: Option<u64>,
}

fn severity_tag(severity: LogSeverity) -> &'static str {
    match severity {
        LogSeverity::Info => "INFO",
        LogSeverity::Success => "OK",
        LogSeverity::Warning => "WARN",
        LogSeverity::Danger => "FAIL",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let args = Args::parse();

    let mut settings = config::load_settings();
    if let Some(url) = args.server_url {
        settings.server_url = url;
    }
    if let Some(ms) = args.poll_interval_ms {
        settings.poll_interval_ms = ms;
    }
    if let Some(ms) = args.recovery_delay_ms {
        settings.recovery_delay_ms = ms;
    }

    let bytes = tokio::fs::read(&args.video)
        .await
        .with_context(|| format!("failed to read {}", args.video.display()))?;
    let filename = args
        .video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video.mp4".to_string());

    info!(server_url = %settings.server_url, filename = %filename, "starting monitoring session");

    let surface = Arc::new(MjpegSurface::new());
    let client = MonitorClient::new_with_timing(
        Arc::new(HttpUploadSubmitter::new(settings.server_url.clone())),
        Arc::new(HttpStreamBinder::new(settings.server_url.clone(), surface)),
        Arc::new(HttpCounterSource::new(settings.server_url.clone())),
        SessionTiming {
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            recovery_delay: Duration::from_millis(settings.recovery_delay_ms),
        },
    );

    let mut events = client.subscribe_events();
    client
        .submit_file(VideoUpload {
            filename,
            bytes,
            mime_type: Some("video/mp4".to_string()),
        })
        .await;

    let mut was_active = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                client.cancel_session().await;
            }
            event = events.recv() => match event {
                Ok(ClientEvent::Log(entry)) => {
                    println!(
                        "[{}] {} {}: {}",
                        severity_tag(entry.severity),
                        entry.at.format("%H:%M:%S"),
                        entry.source,
                        entry.message
                    );
                }
                Ok(ClientEvent::CountersUpdated(counters)) => {
                    println!(
                        "violations: signal={} helmet={} triple={} traffic+helmet={} multiple={}",
                        counters.signal,
                        counters.helmet,
                        counters.triple,
                        counters.traffic_helmet,
                        counters.multiple
                    );
                }
                Ok(ClientEvent::StateChanged(state)) => {
                    info!(?state, "session state changed");
                    match state {
                        SessionState::Idle if was_active => break,
                        SessionState::Idle => {}
                        _ => was_active = true,
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    info!(skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
