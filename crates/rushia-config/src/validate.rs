//! Validation helpers and parsing utilities for configuration values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::{ConfigError, ConfigResult};

/// Parse and validate the service base URL.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not an absolute
/// `http`/`https` URL with a host.
pub fn parse_api_url(field: &str, value: &str) -> ConfigResult<Url> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed)
        .map_err(|_| ConfigError::invalid(field, Some(value.to_string()), "must be a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            field,
            Some(value.to_string()),
            "scheme must be http or https",
        ));
    }
    if url.host_str().is_none() {
        return Err(ConfigError::invalid(
            field,
            Some(value.to_string()),
            "must include a host",
        ));
    }
    Ok(url)
}

/// Parse an unsigned integer supplied as text (environment variables).
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the value is not an integer.
pub fn parse_u64(field: &str, value: &str) -> ConfigResult<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::invalid(field, Some(value.to_string()), "must be an integer"))
}

/// Ensure a duration is strictly positive.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for a zero duration.
pub fn ensure_positive(field: &str, value: Duration) -> ConfigResult<Duration> {
    if value.is_zero() {
        return Err(ConfigError::invalid(
            field,
            Some(format!("{}ms", value.as_millis())),
            "must be greater than zero",
        ));
    }
    Ok(value)
}

/// Ensure the expiry window is at least `min_secs` long.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] when the window is shorter.
pub fn ensure_expiry_window(field: &str, secs: u64, min_secs: u64) -> ConfigResult<Duration> {
    if secs < min_secs {
        return Err(ConfigError::invalid(
            field,
            Some(secs.to_string()),
            "must be at least one minute",
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Ensure the state directory is non-empty.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for an empty path.
pub fn ensure_state_dir(field: &str, path: &Path) -> ConfigResult<PathBuf> {
    if path.as_os_str().is_empty() {
        return Err(ConfigError::invalid(field, None, "must not be empty"));
    }
    Ok(path.to_path_buf())
}

/// Normalise a log level string.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] for an empty value.
pub fn normalize_log_level(field: &str, value: &str) -> ConfigResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, None, "must not be empty"));
    }
    Ok(trimmed.to_ascii_lowercase())
}
