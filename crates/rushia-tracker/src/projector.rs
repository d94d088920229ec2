//! Pure projection from raw task state to display strings.
//!
//! Nothing here touches IO or shared state; every function is deterministic
//! in its inputs so renderers can call it freely.

use std::fmt::{self, Display, Formatter};

use chrono::{DateTime, Utc};
use serde::Serialize;
use url::Url;

use crate::model::{TaskRecord, TaskSnapshot, TaskStatus};

/// Placeholder for values the service has not reported.
pub const UNKNOWN: &str = "unknown";
/// Speed placeholder while a download has not produced a rate yet.
pub const MEASURING: &str = "measuring...";
/// ETA placeholder while a download has not produced an estimate yet.
pub const CALCULATING: &str = "calculating...";
/// Speed and ETA text while the service encodes.
pub const ENCODING: &str = "-- (encoding)";
/// Title placeholder before metadata arrives.
pub const FETCHING_TITLE: &str = "fetching...";

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Icon plus text for a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLabel {
    /// Emoji icon.
    pub icon: &'static str,
    /// Label text.
    pub text: String,
}

impl Display for StatusLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.icon, self.text)
    }
}

/// Label for `status`; unknown values show the raw value.
#[must_use]
pub fn status_label(status: &TaskStatus) -> StatusLabel {
    let (icon, text) = match status {
        TaskStatus::Pending => ("⏳", "Pending"),
        TaskStatus::Downloading => ("⬇️", "Downloading"),
        TaskStatus::Processing => ("⚙️", "Encoding"),
        TaskStatus::Completed => ("✅", "Completed"),
        TaskStatus::Error => ("❌", "Failed"),
        TaskStatus::Unknown(raw) => {
            return StatusLabel {
                icon: "❓",
                text: raw.clone(),
            };
        }
    };
    StatusLabel {
        icon,
        text: text.to_string(),
    }
}

/// Human-readable transfer speed.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn format_speed(bytes_per_sec: Option<f64>) -> String {
    match bytes_per_sec {
        Some(speed) if speed.is_finite() && speed > 0.0 => {
            if speed < KIB {
                format!("{} B/s", speed.round() as u64)
            } else if speed < MIB {
                format!("{:.2} KB/s", speed / KIB)
            } else {
                format!("{:.2} MB/s", speed / MIB)
            }
        }
        _ => UNKNOWN.to_string(),
    }
}

/// Remaining time as `M:SS` or `H:MM:SS`.
#[must_use]
pub fn format_eta(seconds: Option<i64>) -> String {
    match seconds {
        Some(total) if total > 0 => {
            let hours = total / 3600;
            let minutes = (total % 3600) / 60;
            let secs = total % 60;
            if hours > 0 {
                format!("{hours}:{minutes:02}:{secs:02}")
            } else {
                format!("{minutes}:{secs:02}")
            }
        }
        _ => UNKNOWN.to_string(),
    }
}

/// 1024-based size with two decimals above one kilobyte.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    let value = bytes as f64;
    if value < KIB {
        format!("{bytes} B")
    } else if value < MIB {
        format!("{:.2} KB", value / KIB)
    } else if value < GIB {
        format!("{:.2} MB", value / MIB)
    } else {
        format!("{:.2} GB", value / GIB)
    }
}

/// `"done / total"` with `unknown` standing in for missing or zero sizes.
#[must_use]
pub fn format_size_pair(downloaded: Option<u64>, total: Option<u64>) -> String {
    match (downloaded.filter(|n| *n > 0), total.filter(|n| *n > 0)) {
        (Some(done), Some(total)) => format!("{} / {}", format_size(done), format_size(total)),
        (Some(done), None) => format!("{} / {UNKNOWN}", format_size(done)),
        _ => format!("{UNKNOWN} / {UNKNOWN}"),
    }
}

/// Coarse age of `then` relative to `now`.
#[must_use]
pub fn format_relative(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let seconds = (now - then).num_seconds().max(0);
    if seconds < 60 {
        return "moments ago".to_string();
    }
    let (count, unit) = if seconds < 3600 {
        (seconds / 60, "minute")
    } else if seconds < 86_400 {
        (seconds / 3600, "hour")
    } else {
        (seconds / 86_400, "day")
    };
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

/// Presentation-ready state of the followed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    /// Followed task.
    pub task_id: String,
    /// Raw status.
    pub status: TaskStatus,
    /// Status label.
    pub label: StatusLabel,
    /// Completion percentage.
    pub percent: f64,
    /// Percentage text, one decimal.
    pub percent_text: String,
    /// Speed text.
    pub speed: String,
    /// ETA text.
    pub eta: String,
    /// Size text.
    pub size: String,
    /// Media title when known.
    pub title: Option<String>,
}

/// Project a status snapshot for the followed task.
#[must_use]
pub fn project_progress(task_id: &str, snapshot: &TaskSnapshot) -> ProgressView {
    let (speed, eta) = match snapshot.status {
        TaskStatus::Processing => (ENCODING.to_string(), ENCODING.to_string()),
        TaskStatus::Downloading => {
            let speed = format_speed(snapshot.speed_bytes_per_sec);
            let eta = format_eta(snapshot.eta_seconds);
            (
                if speed == UNKNOWN { MEASURING.to_string() } else { speed },
                if eta == UNKNOWN { CALCULATING.to_string() } else { eta },
            )
        }
        _ => (
            format_speed(snapshot.speed_bytes_per_sec),
            format_eta(snapshot.eta_seconds),
        ),
    };
    ProgressView {
        task_id: task_id.to_string(),
        status: snapshot.status.clone(),
        label: status_label(&snapshot.status),
        percent: snapshot.progress,
        percent_text: format!("{:.1}%", snapshot.progress),
        speed,
        eta,
        size: format_size_pair(snapshot.downloaded_bytes, snapshot.total_bytes),
        title: snapshot.title.clone(),
    }
}

/// Action offered on a history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowAction {
    /// Artifact ready to fetch.
    Download {
        /// Artifact filename.
        filename: String,
    },
    /// Work in progress.
    Progress {
        /// Rounded percentage text.
        percent: String,
    },
    /// Nothing to offer.
    None,
}

/// Presentation-ready history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    /// Task id.
    pub task_id: String,
    /// Title, video id or placeholder.
    pub title: String,
    /// Format badge.
    pub format: &'static str,
    /// Status label.
    pub label: StatusLabel,
    /// Age text.
    pub age: String,
    /// Row action.
    pub action: RowAction,
}

/// Display title: stored title, then the `v` query parameter, then a placeholder.
#[must_use]
pub fn display_title(record: &TaskRecord) -> String {
    if let Some(title) = record.title.as_deref().filter(|title| !title.is_empty()) {
        return title.to_string();
    }
    Url::parse(&record.url)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned())
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| FETCHING_TITLE.to_string())
}

/// Project a history record at `now`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn project_record(record: &TaskRecord, now: DateTime<Utc>) -> HistoryRow {
    let action = match (&record.status, &record.filename) {
        (TaskStatus::Completed, Some(filename)) => RowAction::Download {
            filename: filename.clone(),
        },
        (TaskStatus::Downloading | TaskStatus::Processing, _) => RowAction::Progress {
            percent: format!("{}%", record.progress.unwrap_or(0.0).round() as i64),
        },
        _ => RowAction::None,
    };
    HistoryRow {
        task_id: record.task_id.clone(),
        title: display_title(record),
        format: record.format.label(),
        label: status_label(&record.status),
        age: format_relative(record.created_at, now),
        action,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MediaFormat;
    use chrono::Duration;

    #[test]
    fn speed_thresholds() {
        assert_eq!(format_speed(Some(1_572_864.0)), "1.50 MB/s");
        assert_eq!(format_speed(Some(2048.0)), "2.00 KB/s");
        assert_eq!(format_speed(Some(512.4)), "512 B/s");
        assert_eq!(format_speed(Some(0.0)), UNKNOWN);
        assert_eq!(format_speed(Some(-3.0)), UNKNOWN);
        assert_eq!(format_speed(None), UNKNOWN);
    }

    #[test]
    fn eta_formats() {
        assert_eq!(format_eta(Some(125)), "2:05");
        assert_eq!(format_eta(Some(3_725)), "1:02:05");
        assert_eq!(format_eta(Some(0)), UNKNOWN);
        assert_eq!(format_eta(None), UNKNOWN);
    }

    #[test]
    fn sizes_and_pairs() {
        assert_eq!(format_size(500), "500 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.00 GB");
        assert_eq!(format_size_pair(Some(500), Some(0)), "500 B / unknown");
        assert_eq!(format_size_pair(Some(1024), Some(2048)), "1.00 KB / 2.00 KB");
        assert_eq!(format_size_pair(None, Some(2048)), "unknown / unknown");
    }

    #[test]
    fn labels_fall_back_to_raw_values() {
        assert_eq!(status_label(&TaskStatus::Processing).to_string(), "⚙️ Encoding");
        let unknown = status_label(&TaskStatus::Unknown("throttled".into()));
        assert_eq!(unknown.icon, "❓");
        assert_eq!(unknown.text, "throttled");
    }

    #[test]
    fn relative_time_buckets() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp");
        assert_eq!(format_relative(now - Duration::seconds(59), now), "moments ago");
        assert_eq!(format_relative(now - Duration::seconds(60), now), "1 minute ago");
        assert_eq!(format_relative(now - Duration::minutes(59), now), "59 minutes ago");
        assert_eq!(format_relative(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(format_relative(now - Duration::hours(49), now), "2 days ago");
        assert_eq!(format_relative(now + Duration::hours(1), now), "moments ago");
    }

    #[test]
    fn progress_view_uses_placeholders_by_phase() {
        let downloading = TaskSnapshot {
            status: TaskStatus::Downloading,
            progress: 42.0,
            downloaded_bytes: Some(500),
            total_bytes: Some(0),
            ..TaskSnapshot::default()
        };
        let view = project_progress("t1", &downloading);
        assert_eq!(view.speed, MEASURING);
        assert_eq!(view.eta, CALCULATING);
        assert_eq!(view.size, "500 B / unknown");
        assert_eq!(view.percent_text, "42.0%");

        let processing = TaskSnapshot {
            status: TaskStatus::Processing,
            speed_bytes_per_sec: Some(4096.0),
            ..TaskSnapshot::default()
        };
        let view = project_progress("t1", &processing);
        assert_eq!(view.speed, ENCODING);
        assert_eq!(view.eta, ENCODING);
    }

    #[test]
    fn history_rows_pick_title_and_action() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).expect("timestamp");
        let mut record = TaskRecord::pending(
            "t1",
            "https://www.youtube.com/watch?v=abc123&t=5",
            MediaFormat::Audio,
            now - Duration::minutes(3),
        );
        let row = project_record(&record, now);
        assert_eq!(row.title, "abc123");
        assert_eq!(row.format, "M4A");
        assert_eq!(row.age, "3 minutes ago");
        assert_eq!(row.action, RowAction::None);

        record.status = TaskStatus::Downloading;
        record.progress = Some(41.6);
        assert_eq!(
            project_record(&record, now).action,
            RowAction::Progress {
                percent: "42%".into()
            }
        );

        record.status = TaskStatus::Completed;
        record.title = Some("Song".into());
        record.filename = Some("Song.m4a".into());
        let row = project_record(&record, now);
        assert_eq!(row.title, "Song");
        assert_eq!(
            row.action,
            RowAction::Download {
                filename: "Song.m4a".into()
            }
        );

        let bare = TaskRecord::pending("t2", "not a url", MediaFormat::Video, now);
        assert_eq!(display_title(&bare), FETCHING_TITLE);
    }
}
