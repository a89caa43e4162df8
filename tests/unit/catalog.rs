//! Tests for the embedded stream catalog

use tap_stripe::streams::catalog::{CatalogError, StreamCatalog};
use tap_stripe::streams::ExtractionStrategy;

fn names(catalog: &StreamCatalog, patterns: &[&str]) -> Vec<String> {
    catalog
        .select(patterns)
        .unwrap()
        .iter()
        .map(|d| d.name().to_string())
        .collect()
}

#[test]
fn test_catalog_is_shared() {
    let first = StreamCatalog::load().unwrap();
    let second = StreamCatalog::load().unwrap();
    assert!(std::ptr::eq(first, second));
    assert_eq!(first.schema_version(), "1.0.0");
}

#[test]
fn test_every_report_stream_is_keyed_on_synthetic_column() {
    let catalog = StreamCatalog::load().unwrap();
    let reports: Vec<_> = catalog
        .streams()
        .iter()
        .filter(|s| s.strategy() == ExtractionStrategy::ReportExtraction)
        .collect();
    assert_eq!(reports.len(), 4);

    for stream in reports {
        assert_eq!(stream.key_properties(), vec![format!("{}_id", stream.name())]);
        assert_eq!(stream.replication_key(), Some("report_end_at"));
        assert!(stream.path().is_none());
        assert!(!stream.id_keys().is_empty());
    }
}

#[test]
fn test_paginated_streams_keep_primary_keys() {
    let catalog = StreamCatalog::load().unwrap();
    let rates = catalog.get("exchange_rates").unwrap();
    assert_eq!(rates.strategy(), ExtractionStrategy::PaginatedPoll);
    assert_eq!(
        rates.key_properties(),
        vec!["send_currency", "receive_currency", "date"]
    );
    assert_eq!(catalog.get("disputes").unwrap().key_properties(), vec!["id"]);
}

#[test]
fn test_select_keeps_catalog_order_and_dedups() {
    let catalog = StreamCatalog::load().unwrap();
    assert_eq!(
        names(catalog, &["activity_summary_1", "charges", "activity_*"]),
        ["charges", "activity_itemized_2", "activity_summary_1"]
    );
    assert_eq!(
        names(catalog, &[" *_itemized_2 "]),
        ["activity_itemized_2", "balance_change_from_activity_itemized_2"]
    );
    assert_eq!(names(catalog, &["*"]).len(), 9);
}

#[test]
fn test_select_fails_on_any_unknown_name() {
    let catalog = StreamCatalog::load().unwrap();
    let err = catalog.select(&["charges", "refunds"]).unwrap_err();
    assert!(matches!(err, CatalogError::NotFound(_)));
    assert!(err.to_string().contains("refunds"));
}
