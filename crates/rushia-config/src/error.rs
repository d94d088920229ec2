//! Error types for configuration loading.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Field contained an invalid value.
    #[error("invalid configuration field")]
    InvalidField {
        /// Field (or environment variable) that failed validation.
        field: String,
        /// Offending value when available.
        value: Option<String>,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
    /// Configuration file could not be read.
    #[error("failed to read configuration file")]
    Io {
        /// File that failed to load.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// Configuration file was not valid JSON for the expected schema.
    #[error("failed to parse configuration file")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Source serde error.
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub(crate) fn invalid(
        field: impl Into<String>,
        value: Option<String>,
        reason: &'static str,
    ) -> Self {
        Self::InvalidField {
            field: field.into(),
            value,
            reason,
        }
    }

    /// One-line description including the failing field, for operator output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::InvalidField {
                field,
                value: Some(value),
                reason,
            } => format!("{field}={value:?}: {reason}"),
            Self::InvalidField {
                field,
                value: None,
                reason,
            } => format!("{field}: {reason}"),
            Self::Io { path, source } => format!("{}: {source}", path.display()),
            Self::Parse { path, source } => format!("{}: {source}", path.display()),
        }
    }
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_includes_field_and_reason() {
        let err = ConfigError::invalid("api_url", Some("ftp://x".into()), "scheme must be http or https");
        assert_eq!(err.to_string(), "invalid configuration field");
        assert_eq!(
            err.describe(),
            "api_url=\"ftp://x\": scheme must be http or https"
        );

        let bare = ConfigError::invalid("state_dir", None, "must not be empty");
        assert_eq!(bare.describe(), "state_dir: must not be empty");
    }
}
