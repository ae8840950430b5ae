use serde::{Deserialize, Serialize};

/// Violation counters as served by the stats endpoint. Snapshots replace each
/// other wholesale; counts are never merged across ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub signal: u64,
    pub helmet: u64,
    pub triple: u64,
    pub traffic_helmet: u64,
    pub multiple: u64,
}

/// Body of the upload endpoint response: carries either `filepath` on
/// success or `error` on rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_snapshot_parses_flat_stats_object() {
        let parsed: CounterSnapshot = serde_json::from_str(
            r#"{"signal":3,"helmet":1,"triple":0,"traffic_helmet":2,"multiple":1}"#,
        )
        .expect("parse");
        assert_eq!(
            parsed,
            CounterSnapshot {
                signal: 3,
                helmet: 1,
                triple: 0,
                traffic_helmet: 2,
                multiple: 1,
            }
        );
    }

    #[test]
    fn upload_response_accepts_error_only_body() {
        let parsed: UploadResponse =
            serde_json::from_str(r#"{"error":"bad format"}"#).expect("parse");
        assert_eq!(parsed.error.as_deref(), Some("bad format"));
        assert!(parsed.filepath.is_none());
        assert!(parsed.message.is_none());
    }

    #[test]
    fn upload_response_accepts_success_body() {
        let parsed: UploadResponse = serde_json::from_str(
            r#"{"message":"File uploaded successfully","filepath":"clip.mp4"}"#,
        )
        .expect("parse");
        assert_eq!(parsed.filepath.as_deref(), Some("clip.mp4"));
        assert!(parsed.error.is_none());
    }
}
