//! Layered configuration loading.
//!
//! # Design
//! - Layers apply in order: defaults, JSON file, `RUSHIA_*` environment, explicit overrides.
//! - Validation runs once on the merged document so every layer gets the same checks.
//! - Environment access goes through a lookup function so tests never mutate process state.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::defaults::{
    DEFAULT_ACTIVE_POLL_INTERVAL_MS, DEFAULT_API_URL, DEFAULT_EXPIRY_WINDOW_SECS,
    DEFAULT_HISTORY_POLL_INTERVAL_MS, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_LOG_LEVEL,
    DEFAULT_STATE_DIR, MIN_EXPIRY_WINDOW_SECS,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{ClientConfig, ConfigDocument};
use crate::validate::{
    ensure_expiry_window, ensure_positive, ensure_state_dir, normalize_log_level, parse_api_url,
    parse_u64,
};

/// Prefix shared by all configuration environment variables.
pub const ENV_PREFIX: &str = "RUSHIA_";

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Builder that resolves a [`ClientConfig`] from layered sources.
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env: Option<EnvLookup>,
    overrides: ConfigDocument,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Loader reading the process environment and no file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env: Some(Box::new(|name| std::env::var(name).ok())),
            overrides: ConfigDocument::default(),
        }
    }

    /// Read the given JSON file as the second layer.
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Replace the environment lookup.
    #[must_use]
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Some(Box::new(lookup));
        self
    }

    /// Skip the environment layer entirely.
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.env = None;
        self
    }

    /// Apply explicit overrides (typically CLI flags) as the final layer.
    #[must_use]
    pub fn with_overrides(mut self, overrides: ConfigDocument) -> Self {
        self.overrides = overrides;
        self
    }

    /// Resolve and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed, or any
    /// resolved value fails validation.
    pub fn load(&self) -> ConfigResult<ClientConfig> {
        let mut document = ConfigDocument::default();
        if let Some(path) = &self.file {
            document = document.merge(read_file(path)?);
        }
        if let Some(lookup) = &self.env {
            document = document.merge(read_env(lookup)?);
        }
        document = document.merge(self.overrides.clone());
        resolve(document)
    }
}

fn read_file(path: &Path) -> ConfigResult<ConfigDocument> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document = serde_json::from_slice(&bytes).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded configuration file");
    Ok(document)
}

fn read_env(lookup: &EnvLookup) -> ConfigResult<ConfigDocument> {
    let var = |suffix: &str| {
        let name = format!("{ENV_PREFIX}{suffix}");
        lookup(&name).map(|value| (name, value))
    };
    let number = |suffix: &str| -> ConfigResult<Option<u64>> {
        var(suffix)
            .map(|(name, value)| parse_u64(&name, &value))
            .transpose()
    };

    Ok(ConfigDocument {
        api_url: var("API_URL").map(|(_, value)| value),
        http_timeout_secs: number("HTTP_TIMEOUT_SECS")?,
        active_poll_interval_ms: number("ACTIVE_POLL_INTERVAL_MS")?,
        history_poll_interval_ms: number("HISTORY_POLL_INTERVAL_MS")?,
        expiry_window_secs: number("EXPIRY_WINDOW_SECS")?,
        state_dir: var("STATE_DIR").map(|(_, value)| PathBuf::from(value)),
        log_level: var("LOG_LEVEL").map(|(_, value)| value),
        log_format: var("LOG_FORMAT").map(|(_, value)| value),
    })
}

fn resolve(document: ConfigDocument) -> ConfigResult<ClientConfig> {
    let api_url = parse_api_url(
        "api_url",
        document.api_url.as_deref().unwrap_or(DEFAULT_API_URL),
    )?;
    let http_timeout = ensure_positive(
        "http_timeout_secs",
        Duration::from_secs(
            document
                .http_timeout_secs
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
        ),
    )?;
    let active_poll_interval = ensure_positive(
        "active_poll_interval_ms",
        Duration::from_millis(
            document
                .active_poll_interval_ms
                .unwrap_or(DEFAULT_ACTIVE_POLL_INTERVAL_MS),
        ),
    )?;
    let history_poll_interval = ensure_positive(
        "history_poll_interval_ms",
        Duration::from_millis(
            document
                .history_poll_interval_ms
                .unwrap_or(DEFAULT_HISTORY_POLL_INTERVAL_MS),
        ),
    )?;
    let expiry_window = ensure_expiry_window(
        "expiry_window_secs",
        document
            .expiry_window_secs
            .unwrap_or(DEFAULT_EXPIRY_WINDOW_SECS),
        MIN_EXPIRY_WINDOW_SECS,
    )?;
    let state_dir = ensure_state_dir(
        "state_dir",
        document
            .state_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_STATE_DIR)),
    )?;
    let log_level = normalize_log_level(
        "log_level",
        document.log_level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL),
    )?;
    let log_format = match document.log_format {
        Some(format) => match format.trim().to_ascii_lowercase().as_str() {
            value @ ("json" | "pretty") => Some(value.to_string()),
            _ => {
                return Err(ConfigError::invalid(
                    "log_format",
                    Some(format),
                    "must be json or pretty",
                ));
            }
        },
        None => None,
    };

    Ok(ClientConfig {
        api_url,
        http_timeout,
        active_poll_interval,
        history_poll_interval,
        expiry_window,
        state_dir,
        log_level,
        log_format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + Send + Sync + 'static {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_resolve_without_any_layer() {
        let config = ConfigLoader::new().without_env().load().expect("defaults");
        assert_eq!(config.api_url.as_str(), "http://127.0.0.1:8000/");
        assert_eq!(config.http_timeout, Duration::from_secs(10));
        assert_eq!(config.active_poll_interval, Duration::from_secs(1));
        assert_eq!(config.history_poll_interval, Duration::from_secs(2));
        assert_eq!(config.expiry_window, Duration::from_secs(6 * 60 * 60));
        assert_eq!(config.state_dir, PathBuf::from(".rushia"));
        assert_eq!(config.log_level, "info");
        assert!(config.log_format.is_none());
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ConfigLoader::new()
            .with_env(env_from(&[
                ("RUSHIA_API_URL", "https://dl.example"),
                ("RUSHIA_ACTIVE_POLL_INTERVAL_MS", "250"),
                ("RUSHIA_EXPIRY_WINDOW_SECS", "3600"),
                ("RUSHIA_LOG_FORMAT", "JSON"),
            ]))
            .load()
            .expect("env config");
        assert_eq!(config.api_url.host_str(), Some("dl.example"));
        assert_eq!(config.active_poll_interval, Duration::from_millis(250));
        assert_eq!(config.expiry_window, Duration::from_secs(3600));
        assert_eq!(config.log_format.as_deref(), Some("json"));
    }

    #[test]
    fn overrides_beat_environment() {
        let config = ConfigLoader::new()
            .with_env(env_from(&[("RUSHIA_API_URL", "https://env.example")]))
            .with_overrides(ConfigDocument {
                api_url: Some("https://flag.example".into()),
                ..ConfigDocument::default()
            })
            .load()
            .expect("config");
        assert_eq!(config.api_url.host_str(), Some("flag.example"));
    }

    #[test]
    fn malformed_environment_numbers_name_the_variable() {
        let err = ConfigLoader::new()
            .with_env(env_from(&[("RUSHIA_HTTP_TIMEOUT_SECS", "soon")]))
            .load()
            .expect_err("bad number");
        match err {
            ConfigError::InvalidField { field, value, .. } => {
                assert_eq!(field, "RUSHIA_HTTP_TIMEOUT_SECS");
                assert_eq!(value.as_deref(), Some("soon"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn zero_intervals_and_bad_formats_are_rejected() {
        let zero = ConfigLoader::new()
            .without_env()
            .with_overrides(ConfigDocument {
                history_poll_interval_ms: Some(0),
                ..ConfigDocument::default()
            })
            .load();
        assert!(zero.is_err());

        let format = ConfigLoader::new()
            .without_env()
            .with_overrides(ConfigDocument {
                log_format: Some("xml".into()),
                ..ConfigDocument::default()
            })
            .load();
        assert!(format.is_err());
    }
}
