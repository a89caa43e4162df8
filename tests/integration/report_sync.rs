//! Report extraction against a mock API

use serde_json::json;
use tap_stripe::report::{CellValue, ReportError, ReportExtractor, SyncStatus};
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::*;

#[tokio::test]
async fn test_issues_polls_downloads_and_advances_bookmark() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    mount_run_list(&server, vec![]).await;
    let url = mount_file(&server, "run_1.csv", SUMMARY_CSV).await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .and(header_exists("authorization"))
        .and(body_string_contains("report_type=activity.summary.1"))
        .and(body_string_contains("parameters%5Binterval_start%5D=2000"))
        .and(body_string_contains("parameters%5Binterval_end%5D=5000"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "pending"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Not ready on the first poll, ready on the second
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(run_json("run_1", "pending", 2000, 5000, None)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(run_json("run_1", "succeeded", 2000, 5000, Some(&url))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(6));
    let sync = extractor.sync(Some(2000)).await.unwrap();

    assert_eq!(sync.rows.len(), 3);
    for row in &sync.rows {
        assert_eq!(row.get("report_start_at"), Some(&CellValue::Integer(2000)));
        assert_eq!(row.get("report_end_at"), Some(&CellValue::Integer(5000)));
        let key = row.get("activity_summary_1_id").and_then(CellValue::as_str).unwrap();
        assert_eq!(key.len(), 32);
    }
    assert_eq!(sync.rows[0].get("count"), Some(&CellValue::Integer(3)));
    assert_eq!(sync.rows[2].get("gross"), Some(&CellValue::Null));
    assert_eq!(sync.bookmark, Some(5000));

    let interval = sync.interval.unwrap();
    assert_eq!((interval.start, interval.end), (2000, 5000));
    match sync.status {
        SyncStatus::Completed(receipt) => {
            assert_eq!(receipt.run_id, "run_1");
            assert!(!receipt.reused);
            assert_eq!(receipt.bytes, SUMMARY_CSV.len() as u64);
            assert_eq!(receipt.sha256.len(), 64);
        }
        other => panic!("expected completed sync, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reuses_matching_succeeded_run() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    let url = mount_file(&server, "existing.csv", SUMMARY_CSV).await;
    mount_run_list(
        &server,
        vec![
            run_json("frr_pending", "pending", 2000, 5000, None),
            run_json("frr_other_start", "succeeded", 1500, 5000, Some(&url)),
            run_json("frr_match", "succeeded", 2000, 4500, Some(&url)),
            run_json("frr_later_match", "succeeded", 2000, 4800, Some(&url)),
        ],
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    let sync = extractor.sync(Some(2000)).await.unwrap();

    assert_eq!(sync.rows.len(), 3);
    // The reused run's own end is authoritative
    assert_eq!(sync.bookmark, Some(4500));
    assert_eq!(
        sync.rows[0].get("report_end_at"),
        Some(&CellValue::Integer(4500))
    );
    match sync.status {
        SyncStatus::Completed(receipt) => {
            assert_eq!(receipt.run_id, "frr_match");
            assert!(receipt.reused);
        }
        other => panic!("expected completed sync, got {other:?}"),
    }
}

#[tokio::test]
async fn test_reused_run_without_url_is_polled() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    let url = mount_file(&server, "polled.csv", SUMMARY_CSV).await;
    mount_run_list(
        &server,
        vec![run_json("frr_match", "succeeded", 2000, 5000, None)],
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/frr_match"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(run_json("frr_match", "succeeded", 2000, 5000, Some(&url))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    let sync = extractor.sync(Some(2000)).await.unwrap();
    assert_eq!(sync.rows.len(), 3);
    assert_eq!(sync.bookmark, Some(5000));
}

#[tokio::test]
async fn test_empty_window_makes_no_registry_or_issuer_calls() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;

    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "never"})))
        .expect(0)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));

    let sync = extractor.sync(Some(5000)).await.unwrap();
    assert!(sync.rows.is_empty());
    assert_eq!(sync.bookmark, Some(5000));
    assert_eq!(sync.status, SyncStatus::UpToDate);

    // Bookmark past the window end is also up to date
    let sync = extractor.sync(Some(9000)).await.unwrap();
    assert_eq!(sync.bookmark, Some(9000));
    assert_eq!(sync.status, SyncStatus::UpToDate);
}

#[tokio::test]
async fn test_pending_exhaustion_keeps_bookmark() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    mount_run_list(&server, vec![]).await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_slow"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_slow"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(run_json("run_slow", "pending", 2000, 5000, None)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    let sync = extractor.sync(Some(2000)).await.unwrap();

    assert!(sync.rows.is_empty());
    assert_eq!(sync.bookmark, Some(2000));
    assert_eq!(
        sync.status,
        SyncStatus::Pending {
            run_id: "run_slow".to_string()
        }
    );
}

#[tokio::test]
async fn test_lookup_errors_count_as_not_ready() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    mount_run_list(&server, vec![]).await;
    let url = mount_file(&server, "late.csv", SUMMARY_CSV).await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_flaky"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_flaky"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": {"message": "No such run"}})))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_flaky"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(run_json("run_flaky", "succeeded", 2000, 5000, Some(&url))),
        )
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(4));
    let sync = extractor.sync(Some(2000)).await.unwrap();
    assert_eq!(sync.rows.len(), 3);
    assert_eq!(sync.bookmark, Some(5000));
}

#[tokio::test]
async fn test_strict_polling_surfaces_client_errors() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    mount_run_list(&server, vec![]).await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_gone"})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/reporting/report_runs/run_gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let mut policy = fast_policy(4);
    policy.strict = true;
    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), policy);

    match extractor.sync(Some(2000)).await {
        Err(ReportError::RunLookup { run_id, .. }) => assert_eq!(run_id, "run_gone"),
        other => panic!("expected RunLookup error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_availability_is_upstream_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/v1/reporting/report_types/{SUMMARY_TYPE}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": SUMMARY_TYPE,
            "data_available_start": 1000,
        })))
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    match extractor.sync(Some(2000)).await {
        Err(ReportError::UpstreamUnavailable { report_type, .. }) => {
            assert_eq!(report_type, SUMMARY_TYPE)
        }
        other => panic!("expected UpstreamUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_issue_failure_is_not_retried() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    mount_run_list(&server, vec![]).await;

    Mock::given(method("POST"))
        .and(path("/v1/reporting/report_runs"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    match extractor.sync(Some(2000)).await {
        Err(ReportError::IssueFailed { report_type, .. }) => assert_eq!(report_type, SUMMARY_TYPE),
        other => panic!("expected IssueFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_csv_fails_without_rows() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    let url = mount_file(&server, "broken.csv", "a,b\n1,2\n3\n").await;
    mount_run_list(
        &server,
        vec![run_json("frr_match", "succeeded", 2000, 5000, Some(&url))],
    )
    .await;

    let extractor = ReportExtractor::new(client_for(&server), summary_stream(), fast_policy(3));
    match extractor.sync(Some(2000)).await {
        Err(ReportError::Csv(_)) => {}
        other => panic!("expected Csv error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_start_date_used_without_bookmark() {
    let server = MockServer::start().await;
    mount_availability(&server, 1000, 5000).await;
    let url = mount_file(&server, "from_start.csv", SUMMARY_CSV).await;
    mount_run_list(
        &server,
        vec![run_json("frr_start", "succeeded", 3000, 5000, Some(&url))],
    )
    .await;

    let mut stream = summary_stream();
    stream.start_date = Some(3000);
    let extractor = ReportExtractor::new(client_for(&server), stream, fast_policy(3));

    let sync = extractor.sync(None).await.unwrap();
    assert_eq!(sync.rows[0].get("report_start_at"), Some(&CellValue::Integer(3000)));
    assert_eq!(sync.bookmark, Some(5000));
}
