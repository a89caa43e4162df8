//! CLI behavior through the compiled binary

use assert_cmd::Command;
use serde_json::{json, Value};
use std::path::Path;
use tap_stripe::config::API_KEY_ENV;
use tap_stripe::state::StateFile;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::{mount_file, mount_run_list, run_json, SUMMARY_CSV, SUMMARY_TYPE};

fn tap() -> Command {
    let mut cmd = Command::cargo_bin("tap-stripe").unwrap();
    cmd.env_remove(API_KEY_ENV).env("RUST_LOG", "tap_stripe=warn");
    cmd
}

fn write_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
    let path = dir.join("config.json");
    let config = json!({
        "api_key": "sk_test_abcdefghijkl",
        "base_url": base_url,
        "requests_per_second": 100,
        "report": {"max_attempts": 3, "backoff_base_secs": 0.001}
    });
    std::fs::write(&path, config.to_string()).unwrap();
    path
}

fn read_lines(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn test_discover_lists_catalog_as_json() {
    let output = tap().args(["discover", "--format", "json"]).output().unwrap();
    assert!(output.status.success());

    let streams: Vec<Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(streams.len(), 9);
    let summary = streams
        .iter()
        .find(|s| s["stream"] == "activity_summary_1")
        .unwrap();
    assert_eq!(summary["strategy"], "report_extraction");
    assert_eq!(summary["report_type"], SUMMARY_TYPE);
    assert_eq!(summary["key_properties"], json!(["activity_summary_1_id"]));
    assert_eq!(summary["replication_key"], "report_end_at");
}

#[test]
fn test_discover_filters_by_pattern() {
    let output = tap().args(["discover", "activity_*"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Found 2 streams"));
    assert!(stdout.contains("activity_itemized_2"));
    assert!(!stdout.contains("balance_change"));
}

#[test]
fn test_discover_unknown_pattern_fails() {
    tap().args(["discover", "nothing_*"]).assert().failure();
}

#[test]
fn test_validate_config_redacts_key() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://api.stripe.com/v1");

    let output = tap()
        .args(["validate", "config"])
        .arg(&config)
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Valid config"));
    assert!(!stdout.contains("abcdefghijkl"));
}

#[test]
fn test_validate_config_requires_key() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{"start_date": "2024-01-01"}"#).unwrap();

    tap().args(["validate", "config"]).arg(&path).assert().failure();

    // The environment supplies the key
    tap()
        .env(API_KEY_ENV, "sk_test_from_env")
        .args(["validate", "config"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_validate_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let mut state = StateFile::new();
    state.advance("charges", "created", 1_700_000_000);
    state.save(&path).unwrap();

    let output = tap()
        .args(["validate", "state"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8(output.stdout)
        .unwrap()
        .contains("charges created=1700000000"));

    std::fs::write(&path, r#"{"schema_version": "9.9.9", "created_at": 0, "updated_at": 0}"#)
        .unwrap();
    tap().args(["validate", "state"]).arg(&path).assert().failure();
}

#[test]
fn test_max_retries_range_enforced() {
    tap()
        .args(["--max-retries", "0", "discover"])
        .assert()
        .failure();
    tap()
        .args(["--max-retries", "21", "discover"])
        .assert()
        .failure();
}

async fn mount_charges(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/charges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "ch_2", "created": 200}, {"id": "ch_1", "created": 100}],
            "has_more": false,
        })))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_writes_records_and_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/reporting/report_types/{SUMMARY_TYPE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data_available_start": 1000,
            "data_available_end": 5000,
        })))
        .mount(&server)
        .await;
    let url = mount_file(&server, "summary.csv", SUMMARY_CSV).await;
    mount_run_list(
        &server,
        vec![run_json("frr_1", "succeeded", 1000, 5000, Some(&url))],
    )
    .await;
    mount_charges(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &format!("{}/v1", server.uri()));
    let state_path = dir.path().join("state.json");
    let out_path = dir.path().join("out.jsonl");

    let mut cmd = tap();
    cmd.arg("sync")
        .arg("--config")
        .arg(&config)
        .arg("--state")
        .arg(&state_path)
        .arg("--output")
        .arg(&out_path)
        .args(["--streams", "activity_summary_1,charges"]);
    let status = tokio::task::spawn_blocking(move || cmd.output().unwrap().status)
        .await
        .unwrap();
    assert!(status.success());

    let lines = read_lines(&out_path);
    let records: Vec<_> = lines.iter().filter(|l| l["type"] == "RECORD").collect();
    assert_eq!(records.len(), 5);
    assert_eq!(
        records
            .iter()
            .filter(|l| l["stream"] == "activity_summary_1")
            .count(),
        3
    );
    let summary_record = records
        .iter()
        .find(|l| l["stream"] == "activity_summary_1")
        .unwrap();
    assert_eq!(summary_record["record"]["report_start_at"], 1000);
    assert_eq!(summary_record["record"]["report_end_at"], 5000);

    let last = lines.last().unwrap();
    assert_eq!(last["type"], "STATE");
    assert_eq!(last["value"]["bookmarks"]["charges"]["value"], 200);
    assert_eq!(last["value"]["bookmarks"]["activity_summary_1"]["value"], 5000);

    let state = StateFile::load(&state_path).unwrap();
    assert_eq!(state.bookmark("charges"), Some(200));
    assert_eq!(state.bookmark("activity_summary_1"), Some(5000));
    assert_eq!(state.checkpoints().len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sync_failure_still_saves_other_bookmarks() {
    let server = MockServer::start().await;
    // Availability without bounds makes the report stream fail
    Mock::given(method("GET"))
        .and(path(format!("/v1/reporting/report_types/{SUMMARY_TYPE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": SUMMARY_TYPE})))
        .mount(&server)
        .await;
    mount_charges(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &format!("{}/v1", server.uri()));
    let state_path = dir.path().join("state.json");
    let out_path = dir.path().join("out.jsonl");

    let mut cmd = tap();
    cmd.arg("sync")
        .arg("--config")
        .arg(&config)
        .arg("--state")
        .arg(&state_path)
        .arg("--output")
        .arg(&out_path)
        .args(["--streams", "activity_summary_1,charges", "--concurrency", "2"]);
    let output = tokio::task::spawn_blocking(move || cmd.output().unwrap())
        .await
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("activity_summary_1"));

    let state = StateFile::load(&state_path).unwrap();
    assert_eq!(state.bookmark("charges"), Some(200));
    assert_eq!(state.bookmark("activity_summary_1"), None);
}
