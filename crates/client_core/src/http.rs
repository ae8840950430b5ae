//! HTTP-backed collaborator implementations against the analysis backend.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use display_integration::{DisplaySurface, SurfaceBindOptions, SurfaceBinding};
use reqwest::multipart::{Form, Part};
use shared::{
    domain::FileHandle,
    error::{PollError, UploadError},
    protocol::{CounterSnapshot, UploadResponse},
};
use url::Url;

use crate::{CounterSource, StreamBinder, UploadSubmitter, VideoUpload};

const UPLOAD_FIELD: &str = "video";

/// Sends the selected file to the upload endpoint as a multipart payload.
/// Never retries; the caller decides what a failure means.
pub struct HttpUploadSubmitter {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadSubmitter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl UploadSubmitter for HttpUploadSubmitter {
    async fn submit(&self, upload: VideoUpload) -> Result<FileHandle, UploadError> {
        let mut part = Part::bytes(upload.bytes).file_name(upload.filename.clone());
        if let Some(mime) = &upload.mime_type {
            part = part
                .mime_str(mime)
                .map_err(|err| UploadError::network(err.to_string()))?;
        }
        let form = Form::new().part(UPLOAD_FIELD, part);

        let response = self
            .http
            .post(format!("{}/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::network(err.to_string()))?;

        // The backend answers rejections with an `error` body, so the JSON
        // is parsed regardless of status.
        let body: UploadResponse = response
            .json()
            .await
            .map_err(|err| UploadError::network(err.to_string()))?;

        match (body.filepath, body.error) {
            (Some(filepath), _) => Ok(FileHandle(filepath)),
            (None, Some(error)) => Err(UploadError::backend(error)),
            (None, None) => Err(UploadError::backend("upload rejected by backend")),
        }
    }
}

/// Builds the feed URL for a file handle and binds it to the display
/// surface. The `t` query parameter is a cache-defeating nonce.
pub struct HttpStreamBinder {
    base_url: String,
    surface: Arc<dyn DisplaySurface>,
}

impl HttpStreamBinder {
    pub fn new(base_url: impl Into<String>, surface: Arc<dyn DisplaySurface>) -> Self {
        Self {
            base_url: base_url.into(),
            surface,
        }
    }

    fn feed_url(&self, handle: &FileHandle) -> anyhow::Result<Url> {
        let mut url = Url::parse(&format!("{}/video_feed", self.base_url))
            .with_context(|| format!("invalid backend url: {}", self.base_url))?;
        url.query_pairs_mut()
            .append_pair("path", &handle.0)
            .append_pair("t", &Utc::now().timestamp_millis().to_string());
        Ok(url)
    }
}

#[async_trait]
impl StreamBinder for HttpStreamBinder {
    async fn attach(&self, handle: &FileHandle) -> anyhow::Result<Arc<dyn SurfaceBinding>> {
        let feed_url = self.feed_url(handle)?;
        self.surface
            .bind(SurfaceBindOptions {
                feed_url: feed_url.into(),
            })
            .await
    }
}

/// Fetches the violation counters from the stats endpoint.
pub struct HttpCounterSource {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCounterSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl CounterSource for HttpCounterSource {
    async fn fetch(&self) -> Result<CounterSnapshot, PollError> {
        let response = self
            .http
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .map_err(|err| PollError::Http(err.to_string()))?
            .error_for_status()
            .map_err(|err| PollError::Http(err.to_string()))?;

        response
            .json()
            .await
            .map_err(|err| PollError::Malformed(err.to_string()))
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
