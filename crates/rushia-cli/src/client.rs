//! Shared client utilities, error types and configuration wiring for the CLI.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use anyhow::anyhow;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderValue};
use rushia_config::{ClientConfig, ConfigError, ConfigLoader};
use rushia_telemetry::{LogFormat, LoggingConfig, init_logging};
use rushia_tracker::{
    FileStore, HttpTaskClient, SystemClock, Tracker, TrackerError, TrackerSettings,
};
use url::Url;

use crate::cli::{Cli, OutputFormat};

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

/// CLI-level error type to distinguish validation from operational failures.
#[derive(Debug)]
pub(crate) enum CliError {
    Validation(String),
    Failure(anyhow::Error),
}

/// Convenience alias for functions returning a `CliError`.
pub(crate) type CliResult<T> = Result<T, CliError>;

impl CliError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub(crate) fn failure(error: impl Into<anyhow::Error>) -> Self {
        Self::Failure(error.into())
    }

    pub(crate) const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) => 2,
            Self::Failure(_) => 3,
        }
    }

    pub(crate) fn display_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::Failure(error) => format!("{error:#}"),
        }
    }
}

impl Display for CliError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str("cli error")
    }
}

impl std::error::Error for CliError {}

impl From<TrackerError> for CliError {
    fn from(err: TrackerError) -> Self {
        tracing::debug!(error = ?err, "tracker operation failed");
        let message = err.user_message();
        match err {
            TrackerError::Validation { .. }
            | TrackerError::Submission {
                status: Some(400 | 409 | 422),
                ..
            } => Self::Validation(message),
            _ => Self::Failure(anyhow!(message)),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let message = format!("invalid configuration: {}", err.describe());
        match err {
            ConfigError::InvalidField { .. } | ConfigError::Parse { .. } => {
                Self::Validation(message)
            }
            ConfigError::Io { .. } => Self::Failure(anyhow!(message)),
        }
    }
}

/// Application context passed to command handlers.
#[derive(Clone)]
pub(crate) struct AppContext {
    pub(crate) config: ClientConfig,
    pub(crate) client: HttpTaskClient,
    pub(crate) output: OutputFormat,
}

impl AppContext {
    /// Build the HTTP client carrying the trace id on every request.
    pub(crate) fn new(config: ClientConfig, output: OutputFormat, trace_id: &str) -> CliResult<Self> {
        let mut default_headers = HeaderMap::new();
        let request_id = HeaderValue::from_str(trace_id).map_err(|_| {
            CliError::failure(anyhow!("trace identifier contains invalid characters"))
        })?;
        default_headers.insert(HEADER_REQUEST_ID, request_id);

        let http = Client::builder()
            .timeout(config.http_timeout)
            .default_headers(default_headers)
            .build()
            .map_err(|err| CliError::failure(anyhow!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client: HttpTaskClient::new(http, config.api_url.clone()),
            config,
            output,
        })
    }

    /// Tracker persisting under the configured state directory.
    pub(crate) fn tracker(&self) -> Tracker {
        Tracker::new(
            Arc::new(self.client.clone()),
            Arc::new(FileStore::new(self.config.state_dir.clone())),
            Arc::new(SystemClock),
            TrackerSettings::from(&self.config),
        )
    }
}

/// Resolve configuration from the optional file, the environment and CLI flags.
pub(crate) fn load_config(cli: &Cli) -> CliResult<ClientConfig> {
    let mut loader = ConfigLoader::new().with_overrides(cli.config_overrides());
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    Ok(loader.load()?)
}

/// Install the tracing subscriber described by `config`.
pub(crate) fn init_telemetry(config: &ClientConfig) -> CliResult<()> {
    let format = match config.log_format.as_deref() {
        Some(value) => value
            .parse::<LogFormat>()
            .map_err(|err| CliError::validation(err.to_string()))?,
        None => LogFormat::infer(),
    };
    init_logging(&LoggingConfig {
        level: &config.log_level,
        format,
        build_sha: build_identifier(),
    })
    .map_err(|err| CliError::failure(anyhow!("failed to initialise logging: {err}")))
}

/// Identifier stamped on every log line.
///
/// `RUSHIA_BUILD_SHA` set at compile time wins; otherwise the crate version.
pub(crate) const fn build_identifier() -> &'static str {
    match option_env!("RUSHIA_BUILD_SHA") {
        Some(sha) => sha,
        None => env!("CARGO_PKG_VERSION"),
    }
}

/// Parse the API URL provided to the CLI.
pub(crate) fn parse_url(input: &str) -> Result<Url, String> {
    input
        .parse::<Url>()
        .map_err(|err| format!("invalid URL '{input}': {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_identifier_comes_from_the_build() {
        let expected = option_env!("RUSHIA_BUILD_SHA").unwrap_or(env!("CARGO_PKG_VERSION"));
        assert_eq!(build_identifier(), expected);
        assert_ne!(build_identifier(), "dev");
    }

    #[test]
    fn tracker_errors_map_to_exit_codes() {
        let validation = CliError::from(TrackerError::Validation {
            field: "url",
            reason: "Please enter a video URL",
        });
        assert_eq!(validation.exit_code(), 2);
        assert_eq!(validation.display_message(), "Please enter a video URL");

        let rejected = CliError::from(TrackerError::Submission {
            message: "Unsupported URL".into(),
            status: Some(400),
        });
        assert_eq!(rejected.exit_code(), 2);

        let server_side = CliError::from(TrackerError::Submission {
            message: "Failed to create download task".into(),
            status: Some(500),
        });
        assert_eq!(server_side.exit_code(), 3);

        let missing = CliError::from(TrackerError::NotFound {
            task_id: "t-1".into(),
        });
        assert_eq!(missing.exit_code(), 3);
        assert_eq!(
            missing.display_message(),
            "Task no longer exists on the server"
        );
    }

    #[test]
    fn config_errors_are_validation_failures() {
        let err = ConfigLoader::new()
            .without_env()
            .with_overrides(rushia_config::ConfigDocument {
                api_url: Some("ftp://example.com".into()),
                ..rushia_config::ConfigDocument::default()
            })
            .load()
            .expect_err("ftp rejected");
        let cli_err = CliError::from(err);
        assert_eq!(cli_err.exit_code(), 2);
        assert!(cli_err.display_message().starts_with("invalid configuration: api_url"));
    }

    #[test]
    fn parse_url_reports_input() {
        assert!(parse_url("http://127.0.0.1:8000").is_ok());
        let err = parse_url("not a url").expect_err("invalid");
        assert!(err.contains("not a url"));
    }

    #[test]
    fn context_rejects_invalid_trace_ids() {
        let config = ConfigLoader::new().without_env().load().expect("defaults");
        assert!(AppContext::new(config.clone(), OutputFormat::Table, "trace-1").is_ok());
        let err = AppContext::new(config, OutputFormat::Json, "bad\ntrace")
            .err()
            .expect("newline rejected");
        assert_eq!(err.exit_code(), 3);
    }
}
