//! Typed configuration models.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL of the download service.
    pub api_url: Url,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
    /// Interval between active-task status queries.
    pub active_poll_interval: Duration,
    /// Interval between history reconciliation passes.
    pub history_poll_interval: Duration,
    /// Age after which persisted state is discarded.
    pub expiry_window: Duration,
    /// Directory holding persisted tracker state.
    pub state_dir: PathBuf,
    /// Log level passed to the subscriber when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format (`json` or `pretty`); inferred from the build when absent.
    pub log_format: Option<String>,
}

/// Partial configuration document.
///
/// Used for the JSON config file, the environment layer and CLI overrides;
/// every field is optional and later layers win field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigDocument {
    /// Base URL of the download service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    /// Per-request HTTP timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_timeout_secs: Option<u64>,
    /// Active-task polling interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_poll_interval_ms: Option<u64>,
    /// History polling interval in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_poll_interval_ms: Option<u64>,
    /// Expiry window in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_window_secs: Option<u64>,
    /// Directory holding persisted tracker state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Log level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Log output format.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_format: Option<String>,
}

impl ConfigDocument {
    /// Overlay `other` on top of `self`; fields set in `other` win.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            api_url: other.api_url.or(self.api_url),
            http_timeout_secs: other.http_timeout_secs.or(self.http_timeout_secs),
            active_poll_interval_ms: other
                .active_poll_interval_ms
                .or(self.active_poll_interval_ms),
            history_poll_interval_ms: other
                .history_poll_interval_ms
                .or(self.history_poll_interval_ms),
            expiry_window_secs: other.expiry_window_secs.or(self.expiry_window_secs),
            state_dir: other.state_dir.or(self.state_dir),
            log_level: other.log_level.or(self.log_level),
            log_format: other.log_format.or(self.log_format),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_prefers_later_layer_per_field() {
        let base = ConfigDocument {
            api_url: Some("http://base".into()),
            http_timeout_secs: Some(5),
            log_level: Some("debug".into()),
            ..ConfigDocument::default()
        };
        let overlay = ConfigDocument {
            api_url: Some("http://overlay".into()),
            expiry_window_secs: Some(120),
            ..ConfigDocument::default()
        };

        let merged = base.merge(overlay);
        assert_eq!(merged.api_url.as_deref(), Some("http://overlay"));
        assert_eq!(merged.http_timeout_secs, Some(5));
        assert_eq!(merged.expiry_window_secs, Some(120));
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn document_rejects_unknown_fields() {
        let parsed = serde_json::from_str::<ConfigDocument>(r#"{"api_urll": "x"}"#);
        assert!(parsed.is_err());
    }
}
