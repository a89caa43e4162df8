//! Bookmark state persistence and locking

use serde_json::json;
use tap_stripe::report::{DownloadReceipt, SyncStatus};
use tap_stripe::state::{Checkpoint, StateError, StateFile, StateLock};
use tap_stripe::streams::{ReportOutcome, StreamBatch};
use tap_stripe::ReportInterval;
use tempfile::TempDir;

#[test]
fn test_sync_lock_is_exclusive() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");

    let held = StateLock::try_acquire(&path).unwrap();
    match StateLock::try_acquire(&path) {
        Err(StateError::Lock(message)) => assert!(message.contains("in use")),
        Err(other) => panic!("expected lock error, got {other:?}"),
        Ok(_) => panic!("second lock should fail while the first is held"),
    }

    // Holding the sync lock does not block state reads and writes
    let mut state = StateFile::new();
    state.advance("charges", "created", 10);
    state.save(&path).unwrap();
    assert_eq!(StateFile::load(&path).unwrap().bookmark("charges"), Some(10));

    drop(held);
    assert!(StateLock::try_acquire(&path).is_ok());
}

#[test]
fn test_checkpoints_only_for_completed_work() {
    let receipt = DownloadReceipt {
        run_id: "run_1".to_string(),
        reused: false,
        bytes: 120,
        sha256: "0".repeat(64),
    };
    let completed = StreamBatch {
        records: vec![json!({"a": 1}), json!({"a": 2})],
        bookmark: Some(5000),
        report: Some(ReportOutcome {
            interval: Some(ReportInterval { start: 2000, end: 5000 }),
            status: SyncStatus::Completed(receipt),
        }),
    };
    let checkpoint = Checkpoint::from_batch("activity_summary_1", &completed).unwrap();
    assert_eq!(checkpoint.stream(), "activity_summary_1");
    assert_eq!(checkpoint.record_count(), 2);
    assert_eq!(checkpoint.byte_count(), 120);
    assert_eq!(checkpoint.run_id(), Some("run_1"));

    let pending = StreamBatch {
        records: vec![],
        bookmark: Some(2000),
        report: Some(ReportOutcome {
            interval: Some(ReportInterval { start: 2000, end: 5000 }),
            status: SyncStatus::Pending {
                run_id: "run_1".to_string(),
            },
        }),
    };
    assert!(Checkpoint::from_batch("activity_summary_1", &pending).is_none());

    let listing = StreamBatch {
        records: vec![json!({"id": "ch_1"})],
        bookmark: Some(10),
        report: None,
    };
    let checkpoint = Checkpoint::from_batch("charges", &listing).unwrap();
    assert_eq!(checkpoint.run_id(), None);
    assert_eq!(checkpoint.record_count(), 1);
}

#[test]
fn test_oversized_state_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("huge.json");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(tap_stripe::state::file::MAX_STATE_FILE_SIZE + 1).unwrap();

    match StateFile::load(&path) {
        Err(StateError::TooLarge { size, .. }) => {
            assert_eq!(size, tap_stripe::state::file::MAX_STATE_FILE_SIZE + 1)
        }
        other => panic!("expected TooLarge, got {other:?}"),
    }
}

#[test]
fn test_corrupt_state_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("corrupt.json");
    std::fs::write(&path, "{not json").unwrap();
    assert!(matches!(
        StateFile::load(&path),
        Err(StateError::Deserialization(_))
    ));
}

#[tokio::test]
async fn test_save_from_blocking_task() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("state.json");

    let path_clone = path.clone();
    let saved = tokio::task::spawn_blocking(move || {
        let mut state = StateFile::new();
        state.advance("balance_change_from_activity_summary_1", "report_end_at", 86_400);
        state.save(&path_clone)
    })
    .await
    .unwrap();
    assert!(saved.is_ok());

    let loaded = StateFile::load(&path).unwrap();
    assert_eq!(
        loaded.bookmark("balance_change_from_activity_summary_1"),
        Some(86_400)
    );
}
