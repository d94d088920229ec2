use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use rushia_config::{ConfigDocument, ConfigError, ConfigLoader};

#[test]
fn file_layer_is_applied_under_environment_and_overrides() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rushia.json");
    fs::write(
        &path,
        r#"{
            "api_url": "http://file.example:9000",
            "history_poll_interval_ms": 5000,
            "state_dir": "/var/lib/rushia",
            "log_level": "debug"
        }"#,
    )?;

    let config = ConfigLoader::new()
        .with_file(&path)
        .with_env(|name| (name == "RUSHIA_LOG_LEVEL").then(|| "warn".to_string()))
        .with_overrides(ConfigDocument {
            http_timeout_secs: Some(3),
            ..ConfigDocument::default()
        })
        .load()?;

    assert_eq!(config.api_url.port(), Some(9000));
    assert_eq!(config.history_poll_interval, Duration::from_secs(5));
    assert_eq!(config.state_dir, PathBuf::from("/var/lib/rushia"));
    assert_eq!(config.log_level, "warn");
    assert_eq!(config.http_timeout, Duration::from_secs(3));
    Ok(())
}

#[test]
fn missing_file_reports_io_error_with_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.json");

    let err = ConfigLoader::new()
        .without_env()
        .with_file(&path)
        .load()
        .expect_err("missing file");
    match err {
        ConfigError::Io { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn malformed_file_reports_parse_error() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("rushia.json");
    fs::write(&path, r#"{"expiry_window_secs": "six hours"}"#)?;

    let err = ConfigLoader::new()
        .without_env()
        .with_file(&path)
        .load()
        .expect_err("bad document");
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.describe().contains("rushia.json"));
    Ok(())
}

#[test]
fn short_expiry_window_is_rejected() {
    let err = ConfigLoader::new()
        .without_env()
        .with_overrides(ConfigDocument {
            expiry_window_secs: Some(30),
            ..ConfigDocument::default()
        })
        .load()
        .expect_err("window too short");
    match err {
        ConfigError::InvalidField { field, reason, .. } => {
            assert_eq!(field, "expiry_window_secs");
            assert_eq!(reason, "must be at least one minute");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
