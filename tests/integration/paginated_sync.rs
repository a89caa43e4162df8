//! Paginated streams against a mock API

use serde_json::json;
use tap_stripe::streams::catalog::StreamCatalog;
use tap_stripe::streams::{create_extractor, ExtractorOptions};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::support::client_for;

#[tokio::test]
async fn test_charges_follow_cursor_and_keep_max_created() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/charges"))
        .and(query_param("limit", "100"))
        .and(query_param("created[gt]", "200"))
        .and(query_param("starting_after", "ch_2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "ch_1", "created": 400}],
            "has_more": false,
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/charges"))
        .and(query_param("created[gt]", "200"))
        .and(query_param_is_missing("starting_after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [{"id": "ch_3", "created": 300}, {"id": "ch_2", "created": 250}],
            "has_more": true,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = StreamCatalog::load().unwrap();
    let extractor = create_extractor(
        catalog.get("charges").unwrap(),
        client_for(&server),
        &ExtractorOptions::default(),
    )
    .unwrap();

    let batch = extractor.sync(Some(200)).await.unwrap();
    let ids: Vec<_> = batch.records.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["ch_3", "ch_2", "ch_1"]);
    assert_eq!(batch.bookmark, Some(400));
    assert!(batch.report.is_none());
}

#[tokio::test]
async fn test_empty_listing_keeps_bookmark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/disputes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [],
            "has_more": false,
        })))
        .mount(&server)
        .await;

    let catalog = StreamCatalog::load().unwrap();
    let extractor = create_extractor(
        catalog.get("disputes").unwrap(),
        client_for(&server),
        &ExtractorOptions::default(),
    )
    .unwrap();

    let batch = extractor.sync(Some(1234)).await.unwrap();
    assert!(batch.records.is_empty());
    assert_eq!(batch.bookmark, Some(1234));
}

#[tokio::test]
async fn test_start_date_filters_first_sync() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/payment_intents"))
        .and(query_param("created[gt]", "1700000000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": "pi_1", "created": 1700000100}],
            "has_more": false,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = StreamCatalog::load().unwrap();
    let options = ExtractorOptions {
        start_date: Some(1_700_000_000),
        ..Default::default()
    };
    let extractor =
        create_extractor(catalog.get("payment_intents").unwrap(), client_for(&server), &options)
            .unwrap();

    let batch = extractor.sync(None).await.unwrap();
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.bookmark, Some(1_700_000_100));
}

#[tokio::test]
async fn test_exchange_rates_flatten_without_bookmark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/exchange_rates"))
        .and(query_param_is_missing("created[gt]"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"id": "usd", "object": "exchange_rate", "rates": {"eur": 0.91, "gbp": 0.79}},
                {"id": "eur", "object": "exchange_rate", "rates": {"usd": 1.09}}
            ],
            "has_more": false,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let catalog = StreamCatalog::load().unwrap();
    let options = ExtractorOptions {
        start_date: Some(1_700_000_000),
        ..Default::default()
    };
    let extractor =
        create_extractor(catalog.get("exchange_rates").unwrap(), client_for(&server), &options)
            .unwrap();

    let batch = extractor.sync(None).await.unwrap();
    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.bookmark, None);
    let first = &batch.records[0];
    assert_eq!(first["send_currency"], "usd");
    assert_eq!(first["receive_currency"], "eur");
    assert_eq!(first["rate"], 0.91);
    assert_eq!(first["date"].as_str().unwrap().len(), "2024-01-01 00:00:00".len());
}
