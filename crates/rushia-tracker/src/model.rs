//! Domain types for tracked download tasks.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rushia_api_models::TaskStatusResponse;
use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Lifecycle state reported by the download service.
///
/// Values the client does not recognise are carried verbatim in
/// [`TaskStatus::Unknown`] so parsing never fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker.
    #[default]
    Pending,
    /// Fetching media from the source.
    Downloading,
    /// Encoding the fetched media.
    Processing,
    /// Artifact is ready for download.
    Completed,
    /// Task failed.
    Error,
    /// Unrecognised raw value.
    Unknown(String),
}

impl TaskStatus {
    /// Parse a raw status string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "pending" => Self::Pending,
            "downloading" => Self::Downloading,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            "error" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Unknown(raw) => raw,
        }
    }

    /// `completed` and `error` end a task; everything else may still change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Statuses a restored session resumes polling for.
    #[must_use]
    pub const fn is_in_progress(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading | Self::Processing)
    }
}

impl From<String> for TaskStatus {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<TaskStatus> for String {
    fn from(value: TaskStatus) -> Self {
        match value {
            TaskStatus::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output container requested from the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaFormat {
    /// Audio only (`m4a`).
    #[serde(rename = "m4a", alias = "audio")]
    Audio,
    /// Audio and video (`mp4`).
    #[serde(rename = "mp4", alias = "video")]
    Video,
}

impl MediaFormat {
    /// Value sent to the service.
    #[must_use]
    pub const fn wire(self) -> &'static str {
        match self {
            Self::Audio => "m4a",
            Self::Video => "mp4",
        }
    }

    /// Badge shown next to history rows.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Audio => "M4A",
            Self::Video => "MP4",
        }
    }
}

impl FromStr for MediaFormat {
    type Err = TrackerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "m4a" | "audio" => Ok(Self::Audio),
            "mp4" | "video" => Ok(Self::Video),
            _ => Err(TrackerError::Validation {
                field: "format",
                reason: "format must be m4a (audio) or mp4 (video)",
            }),
        }
    }
}

impl Display for MediaFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire())
    }
}

/// Drop sub-millisecond precision so timestamps survive the epoch-ms encoding.
#[must_use]
pub fn truncate_to_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// One history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// Server-assigned identifier, unique within the ledger.
    pub task_id: String,
    /// Source URL as submitted.
    pub url: String,
    /// Requested format.
    pub format: MediaFormat,
    /// Submission time.
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last known status.
    pub status: TaskStatus,
    /// Media title once known.
    #[serde(default)]
    pub title: Option<String>,
    /// Artifact filename once completed.
    #[serde(default)]
    pub filename: Option<String>,
    /// Last known progress percentage.
    #[serde(default)]
    pub progress: Option<f64>,
}

impl TaskRecord {
    /// Fresh record for a just-submitted task.
    #[must_use]
    pub fn pending(
        task_id: impl Into<String>,
        url: impl Into<String>,
        format: MediaFormat,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            url: url.into(),
            format,
            created_at: truncate_to_millis(created_at),
            status: TaskStatus::Pending,
            title: None,
            filename: None,
            progress: None,
        }
    }

    /// Merge `patch` into the record, returning whether anything changed.
    ///
    /// Absent patch fields keep the stored value. A filename is only kept
    /// while the record is completed.
    pub fn apply(&mut self, patch: &RecordPatch) -> bool {
        let before = self.clone();
        if let Some(status) = &patch.status {
            self.status = status.clone();
        }
        if let Some(title) = &patch.title {
            self.title = Some(title.clone());
        }
        if let Some(progress) = patch.progress {
            self.progress = Some(progress.clamp(0.0, 100.0));
        }
        if self.status == TaskStatus::Completed {
            if let Some(filename) = &patch.filename {
                self.filename = Some(filename.clone());
            }
        } else {
            self.filename = None;
        }
        *self != before
    }

    /// Whether `patch` would change the fields history reconciliation watches.
    #[must_use]
    pub fn differs_from(&self, patch: &RecordPatch) -> bool {
        patch
            .status
            .as_ref()
            .is_some_and(|status| *status != self.status)
            || patch
                .title
                .as_ref()
                .is_some_and(|title| self.title.as_ref() != Some(title))
            || patch
                .filename
                .as_ref()
                .is_some_and(|filename| self.filename.as_ref() != Some(filename))
    }
}

/// Partial update for a [`TaskRecord`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    /// New status.
    pub status: Option<TaskStatus>,
    /// New title.
    pub title: Option<String>,
    /// New filename (ignored unless the status is completed).
    pub filename: Option<String>,
    /// New progress percentage.
    pub progress: Option<f64>,
}

impl RecordPatch {
    /// Patch that only changes the status.
    #[must_use]
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Patch carrying everything a status query reported.
    #[must_use]
    pub fn from_snapshot(snapshot: &TaskSnapshot) -> Self {
        let filename = if snapshot.status == TaskStatus::Completed {
            snapshot.filename.clone()
        } else {
            None
        };
        Self {
            status: Some(snapshot.status.clone()),
            title: snapshot.title.clone(),
            filename,
            progress: Some(snapshot.progress),
        }
    }
}

/// Persisted pointer to the task the user is currently following.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTaskPointer {
    /// Followed task.
    pub task_id: String,
    /// When the pointer was written.
    #[serde(rename = "timestamp", with = "chrono::serde::ts_milliseconds")]
    pub saved_at: DateTime<Utc>,
}

impl ActiveTaskPointer {
    /// Pointer for `task_id` saved at `now`.
    #[must_use]
    pub fn new(task_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.into(),
            saved_at: truncate_to_millis(now),
        }
    }
}

/// Server-reported state of one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskSnapshot {
    /// Reported status.
    pub status: TaskStatus,
    /// Completion percentage in `[0, 100]`.
    pub progress: f64,
    /// Transfer speed.
    pub speed_bytes_per_sec: Option<f64>,
    /// Estimated remaining seconds.
    pub eta_seconds: Option<i64>,
    /// Bytes fetched so far.
    pub downloaded_bytes: Option<u64>,
    /// Expected total size.
    pub total_bytes: Option<u64>,
    /// Media title.
    pub title: Option<String>,
    /// Artifact filename.
    pub filename: Option<String>,
    /// Failure description.
    pub error_message: Option<String>,
}

impl From<TaskStatusResponse> for TaskSnapshot {
    fn from(response: TaskStatusResponse) -> Self {
        let progress = if response.progress.is_finite() {
            response.progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        Self {
            status: TaskStatus::parse(&response.status),
            progress,
            speed_bytes_per_sec: response.speed,
            eta_seconds: response.eta,
            downloaded_bytes: response.downloaded_bytes,
            total_bytes: response.total_bytes,
            title: response.title.filter(|title| !title.is_empty()),
            filename: response.filename.filter(|name| !name.is_empty()),
            error_message: response.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).expect("valid timestamp")
    }

    #[test]
    fn unknown_statuses_are_carried_and_non_terminal() {
        let status = TaskStatus::parse("queued_remote");
        assert_eq!(status, TaskStatus::Unknown("queued_remote".into()));
        assert!(!status.is_terminal());
        assert!(!status.is_in_progress());
        assert_eq!(String::from(status), "queued_remote");
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Error.is_terminal());
        assert!(TaskStatus::Processing.is_in_progress());
    }

    #[test]
    fn format_accepts_wire_values_and_aliases() {
        assert_eq!("m4a".parse::<MediaFormat>().ok(), Some(MediaFormat::Audio));
        assert_eq!("VIDEO".parse::<MediaFormat>().ok(), Some(MediaFormat::Video));
        assert!("flac".parse::<MediaFormat>().is_err());

        let parsed: MediaFormat = serde_json::from_value(json!("audio")).expect("alias");
        assert_eq!(parsed, MediaFormat::Audio);
        assert_eq!(serde_json::to_value(MediaFormat::Video).expect("ser"), json!("mp4"));
    }

    #[test]
    fn record_uses_stable_storage_layout() {
        let mut record = TaskRecord::pending(
            "t1",
            "https://x/watch?v=abc",
            MediaFormat::Audio,
            at(1_700_000_000_123),
        );
        record.progress = Some(12.5);
        let value = serde_json::to_value(&record).expect("serialize");
        assert_eq!(
            value,
            json!({
                "taskId": "t1",
                "url": "https://x/watch?v=abc",
                "format": "m4a",
                "timestamp": 1_700_000_000_123_i64,
                "status": "pending",
                "title": null,
                "filename": null,
                "progress": 12.5
            })
        );
        let back: TaskRecord = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, record);
    }

    #[test]
    fn apply_preserves_absent_fields_and_title() {
        let mut record = TaskRecord::pending("t1", "u", MediaFormat::Video, at(0));
        assert!(record.apply(&RecordPatch {
            title: Some("Song".into()),
            ..RecordPatch::default()
        }));
        assert!(record.apply(&RecordPatch::status(TaskStatus::Downloading)));
        assert_eq!(record.title.as_deref(), Some("Song"));
        assert!(!record.apply(&RecordPatch::default()));
    }

    #[test]
    fn filename_only_sticks_to_completed_records() {
        let mut record = TaskRecord::pending("t1", "u", MediaFormat::Audio, at(0));
        record.apply(&RecordPatch {
            status: Some(TaskStatus::Processing),
            filename: Some("early.m4a".into()),
            ..RecordPatch::default()
        });
        assert!(record.filename.is_none());

        record.apply(&RecordPatch {
            status: Some(TaskStatus::Completed),
            filename: Some("song.m4a".into()),
            ..RecordPatch::default()
        });
        assert_eq!(record.filename.as_deref(), Some("song.m4a"));
    }

    #[test]
    fn snapshot_patch_drops_filename_before_completion() {
        let snapshot = TaskSnapshot {
            status: TaskStatus::Downloading,
            progress: 42.0,
            filename: Some("partial.mp4".into()),
            ..TaskSnapshot::default()
        };
        let patch = RecordPatch::from_snapshot(&snapshot);
        assert_eq!(patch.status, Some(TaskStatus::Downloading));
        assert_eq!(patch.progress, Some(42.0));
        assert!(patch.filename.is_none());
        assert!(patch.title.is_none());
    }

    #[test]
    fn response_conversion_normalises_fields() {
        let snapshot = TaskSnapshot::from(TaskStatusResponse {
            status: "downloading".into(),
            progress: 140.0,
            title: Some(String::new()),
            speed: Some(2048.0),
            ..TaskStatusResponse::default()
        });
        assert_eq!(snapshot.status, TaskStatus::Downloading);
        assert!((snapshot.progress - 100.0).abs() < f64::EPSILON);
        assert!(snapshot.title.is_none());
        assert_eq!(snapshot.speed_bytes_per_sec, Some(2048.0));
    }
}
