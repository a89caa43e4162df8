//! Tests for config loading and validation

use std::time::Duration;
use tap_stripe::config::{ConfigError, TapConfig};
use tempfile::TempDir;

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{"api_key": "sk_test_abcdefghijkl", "start_date": "2024-01-01", "report": {"max_attempts": 2}}"#,
    )
    .unwrap();

    let config = TapConfig::load(&path).unwrap();
    assert_eq!(config.start_timestamp().unwrap(), Some(1_704_067_200));

    let options = config.extractor_options();
    assert_eq!(options.start_date, Some(1_704_067_200));
    assert_eq!(options.poll_policy.max_attempts, 2);
    assert_eq!(options.poll_policy.backoff_base, Duration::from_secs(1));
    assert!(!options.poll_policy.strict);
}

#[test]
fn test_load_missing_file() {
    let dir = TempDir::new().unwrap();
    let err = TapConfig::load(&dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
}

#[test]
fn test_load_malformed_json() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(
        TapConfig::load(&path).unwrap_err(),
        ConfigError::Parse(_)
    ));
}

#[test]
fn test_env_override_replaces_file_key() {
    let mut config =
        TapConfig::from_json_str(r#"{"api_key": "sk_test_from_file"}"#).unwrap();
    config.apply_api_key_override(None);
    assert_eq!(config.api_key.expose(), "sk_test_from_file");

    config.apply_api_key_override(Some("sk_test_from_env".to_string()));
    assert_eq!(config.api_key.expose(), "sk_test_from_env");
}

#[test]
fn test_epoch_start_date() {
    let config = TapConfig::from_json_str(
        r#"{"api_key": "sk_test_abcdefghijkl", "start_date": "1700000000"}"#,
    )
    .unwrap();
    assert_eq!(config.start_timestamp().unwrap(), Some(1_700_000_000));
}

#[test]
fn test_negative_backoff_rejected() {
    let config = TapConfig::from_json_str(
        r#"{"api_key": "sk_test_abcdefghijkl", "report": {"backoff_base_secs": -1}}"#,
    )
    .unwrap();
    assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_debug_output_hides_key() {
    let config =
        TapConfig::from_json_str(r#"{"api_key": "sk_live_abcdefghijklmnop"}"#).unwrap();
    let debug = format!("{config:?}");
    assert!(debug.contains("sk_live_"));
    assert!(!debug.contains("abcdefghijklmnop"));
}
