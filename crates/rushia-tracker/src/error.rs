//! Error types for the tracker.

use std::error::Error;
use std::io;

use thiserror::Error;

/// Primary error type for tracker operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Caller input was rejected before any request was made.
    #[error("invalid input")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: &'static str,
    },
    /// The service refused to create a task.
    #[error("task submission rejected")]
    Submission {
        /// Message from the service or a generic fallback.
        message: String,
        /// HTTP status when the service answered.
        status: Option<u16>,
    },
    /// The service does not know the task.
    #[error("task not found")]
    NotFound {
        /// Missing task identifier.
        task_id: String,
    },
    /// Network failure, timeout or undecodable response.
    #[error("service temporarily unavailable")]
    Transient {
        /// Operation identifier.
        operation: &'static str,
        /// Task the request concerned, when any.
        task_id: Option<String>,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Persisted state could not be decoded.
    #[error("persisted state is corrupt")]
    CorruptState {
        /// Storage key holding the bad document.
        key: &'static str,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// State could not be encoded for persistence.
    #[error("failed to encode persisted state")]
    Encode {
        /// Storage key being written.
        key: &'static str,
        /// Encode failure.
        #[source]
        source: serde_json::Error,
    },
    /// The persistent backend failed.
    #[error("state store operation failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Key or path involved.
        key: String,
        /// Underlying IO failure.
        #[source]
        source: io::Error,
    },
    /// Cookie upload or deletion failed.
    #[error("cookie operation failed")]
    Cookie {
        /// Operation identifier.
        operation: &'static str,
        /// Message from the service or a generic fallback.
        message: String,
    },
    /// The completed artifact could not be fetched.
    #[error("artifact download failed")]
    Artifact {
        /// Requested artifact.
        filename: String,
        /// HTTP status returned by the service.
        status: u16,
    },
}

impl TrackerError {
    pub(crate) fn transient(
        operation: &'static str,
        task_id: Option<&str>,
        source: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> Self {
        Self::Transient {
            operation,
            task_id: task_id.map(str::to_string),
            source: source.into(),
        }
    }

    /// Whether the failure may succeed on a later attempt.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Message suitable for an error view.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { reason, .. } => (*reason).to_string(),
            Self::Submission { message, .. } | Self::Cookie { message, .. } => message.clone(),
            Self::NotFound { .. } => "Task no longer exists on the server".to_string(),
            Self::Transient { source, .. } => format!("Could not reach the service: {source}"),
            Self::CorruptState { .. } | Self::Encode { .. } | Self::Store { .. } => {
                "Local state could not be saved or loaded".to_string()
            }
            Self::Artifact { filename, status } => {
                format!("Could not download {filename} (status {status})")
            }
        }
    }
}

/// Convenience alias for tracker results.
pub type TrackerResult<T> = Result<T, TrackerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_constant_and_user_message_carries_detail() {
        let err = TrackerError::Submission {
            message: "Unsupported URL".into(),
            status: Some(400),
        };
        assert_eq!(err.to_string(), "task submission rejected");
        assert_eq!(err.user_message(), "Unsupported URL");

        let validation = TrackerError::Validation {
            field: "url",
            reason: "Please enter a URL",
        };
        assert_eq!(validation.user_message(), "Please enter a URL");
        assert!(!validation.is_transient());
    }

    #[test]
    fn transient_keeps_source_chain() {
        let err = TrackerError::transient(
            "query",
            Some("t1"),
            io::Error::new(io::ErrorKind::TimedOut, "timed out"),
        );
        assert!(err.is_transient());
        let source = err.source().map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("timed out"));
    }
}
