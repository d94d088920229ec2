#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
//! Wire DTOs for the Rushia download service HTTP API.
//!
//! These types mirror the JSON documents exchanged with the remote service
//! verbatim. Domain mapping (status parsing, validation, merge semantics)
//! lives in `rushia-tracker`; nothing here interprets the payloads.
use serde::{Deserialize, Serialize};

/// Path for task creation.
pub const DOWNLOAD_PATH: &str = "/api/download";
/// Path prefix for task status queries.
pub const STATUS_PATH: &str = "/api/status";
/// Path for cookie uploads.
pub const UPLOAD_COOKIE_PATH: &str = "/api/upload-cookie";
/// Path prefix for cookie deletion.
pub const COOKIE_PATH: &str = "/api/cookie";

/// Body of `POST /api/download`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Media page URL to fetch.
    pub url: String,
    /// Requested output format (`m4a` or `mp4`).
    pub format: String,
    /// Identifier of a previously uploaded cookie file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_id: Option<String>,
}

/// Successful response to `POST /api/download`.
///
/// The service answers with a full status document; only `task_id` is
/// required by clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadAccepted {
    /// Server-assigned task identifier.
    pub task_id: String,
    /// Initial status, normally `pending`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Initial progress, normally `0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
}

/// Body of `GET /api/status/{task_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskStatusResponse {
    /// Echoed task identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    /// Raw status string.
    pub status: String,
    /// Completion percentage in `[0, 100]`.
    #[serde(default)]
    pub progress: f64,
    /// Artifact filename, present once completed.
    #[serde(default)]
    pub filename: Option<String>,
    /// Failure description for errored tasks.
    #[serde(default)]
    pub error: Option<String>,
    /// Media title once metadata is known.
    #[serde(default)]
    pub title: Option<String>,
    /// Transfer speed in bytes per second.
    #[serde(default)]
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    #[serde(default)]
    pub eta: Option<i64>,
    /// Bytes fetched so far.
    #[serde(default)]
    pub downloaded_bytes: Option<u64>,
    /// Expected total bytes.
    #[serde(default)]
    pub total_bytes: Option<u64>,
    /// Seconds since the transfer started.
    #[serde(default)]
    pub elapsed: Option<f64>,
}

/// Error document returned by the service on non-2xx responses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorDetail {
    /// Human-readable failure description.
    #[serde(default)]
    pub detail: Option<String>,
}

/// Successful response to `POST /api/upload-cookie`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CookieUploaded {
    /// Identifier to pass as `cookie_id` on later submissions.
    pub cookie_id: String,
    /// Informational message from the service.
    #[serde(default)]
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn download_request_omits_missing_cookie() {
        let request = DownloadRequest {
            url: "https://www.youtube.com/watch?v=abc".into(),
            format: "m4a".into(),
            cookie_id: None,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(
            value,
            json!({"url": "https://www.youtube.com/watch?v=abc", "format": "m4a"})
        );
    }

    #[test]
    fn status_response_tolerates_sparse_documents() {
        let parsed: TaskStatusResponse =
            serde_json::from_value(json!({"status": "pending"})).expect("parse");
        assert_eq!(parsed.status, "pending");
        assert!(parsed.progress.abs() < f64::EPSILON);
        assert!(parsed.title.is_none());
        assert!(parsed.total_bytes.is_none());
    }

    #[test]
    fn status_response_reads_null_fields() {
        let parsed: TaskStatusResponse = serde_json::from_value(json!({
            "task_id": "t-1",
            "status": "downloading",
            "progress": 42.5,
            "filename": null,
            "error": null,
            "title": "Song",
            "speed": 2048.0,
            "eta": 30,
            "downloaded_bytes": 1024,
            "total_bytes": 4096,
            "elapsed": 1.5
        }))
        .expect("parse");
        assert_eq!(parsed.task_id.as_deref(), Some("t-1"));
        assert_eq!(parsed.title.as_deref(), Some("Song"));
        assert_eq!(parsed.eta, Some(30));
        assert_eq!(parsed.downloaded_bytes, Some(1024));
    }

    #[test]
    fn error_detail_defaults_when_body_lacks_detail() {
        let parsed: ErrorDetail = serde_json::from_value(json!({})).expect("parse");
        assert!(parsed.detail.is_none());
    }
}
