use thiserror::Error;

/// Upload failures as reported to the user: the backend's own message, or a
/// generic line when the request never produced a parseable response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("{message}")]
    Backend { message: String },
    #[error("Upload failed.")]
    Network { detail: String },
}

impl UploadError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }
}

/// Per-tick counter poll failure. Transient; never fatal to the session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollError {
    #[error("stats request failed: {0}")]
    Http(String),
    #[error("malformed stats payload: {0}")]
    Malformed(String),
}
