//! Baseline values applied before any file or environment layer.
//!
//! # Design
//! - Mirror the service defaults so a fresh checkout talks to a local server.
//! - Keep time-based defaults explicit for auditability.

/// Service address used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
/// Per-request HTTP timeout in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
/// Active-task polling interval in milliseconds.
pub const DEFAULT_ACTIVE_POLL_INTERVAL_MS: u64 = 1_000;
/// History polling interval in milliseconds.
pub const DEFAULT_HISTORY_POLL_INTERVAL_MS: u64 = 2_000;
/// Age after which the active pointer and history entries are discarded.
pub const DEFAULT_EXPIRY_WINDOW_SECS: u64 = 6 * 60 * 60;
/// Smallest accepted expiry window.
pub const MIN_EXPIRY_WINDOW_SECS: u64 = 60;
/// Directory holding persisted tracker state.
pub const DEFAULT_STATE_DIR: &str = ".rushia";
/// Log level used when neither config nor `RUST_LOG` specify one.
pub const DEFAULT_LOG_LEVEL: &str = "info";
