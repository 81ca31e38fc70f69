//! CoinDesk Client Integration Tests
//!
//! Runs the client against a mock HTTP server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use price_streamer::{CoinDeskClient, PriceSource, PriceSourceError, SourceSettings};

fn client_for(server: &MockServer, symbol: &str) -> CoinDeskClient {
    let settings = SourceSettings {
        api_url: format!("{}/asset/v1/top/list", server.uri()),
        symbol: symbol.to_string(),
        timeout: Duration::from_millis(500),
        stale_after: Duration::from_secs(3600),
    };
    CoinDeskClient::new(&settings).unwrap()
}

fn top_list(updated: i64) -> serde_json::Value {
    json!({
        "Data": {
            "STATS": {"PAGE": 1, "PAGE_SIZE": 2, "TOTAL_ASSETS": 2},
            "LIST": [
                {"ID": 2, "SYMBOL": "ETH", "NAME": "Ethereum", "PRICE_USD": 3400.0,
                 "PRICE_USD_LAST_UPDATE_TS": updated},
                {"ID": 1, "SYMBOL": "BTC", "NAME": "Bitcoin", "PRICE_USD": 65000.0,
                 "PRICE_USD_LAST_UPDATE_TS": updated}
            ]
        },
        "Err": {}
    })
}

#[tokio::test]
async fn test_fetch_selects_configured_symbol() {
    let server = MockServer::start().await;
    let updated = Utc::now().timestamp() - 10;

    Mock::given(method("GET"))
        .and(path("/asset/v1/top/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(top_list(updated)))
        .expect(1)
        .mount(&server)
        .await;

    let sample = client_for(&server, "BTC").fetch_latest().await.unwrap();

    assert_eq!(sample.symbol, "BTC");
    assert_eq!(sample.name, "Bitcoin");
    assert_eq!(sample.price, Decimal::from(65_000));
    assert_eq!(sample.timestamp, Utc.timestamp_opt(updated, 0).unwrap());
}

#[tokio::test]
async fn test_stale_upstream_timestamp_uses_now() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(top_list(1_000)))
        .mount(&server)
        .await;

    let before = Utc::now();
    let sample = client_for(&server, "ETH").fetch_latest().await.unwrap();

    assert_eq!(sample.symbol, "ETH");
    assert!(sample.timestamp >= before);
}

#[tokio::test]
async fn test_missing_symbol_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(top_list(1_000)))
        .mount(&server)
        .await;

    let err = client_for(&server, "DOGE").fetch_latest().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::SymbolNotFound { ref symbol } if symbol == "DOGE"));
}

#[tokio::test]
async fn test_malformed_other_assets_do_not_block_selected_symbol() {
    let server = MockServer::start().await;
    let updated = Utc::now().timestamp() - 10;

    let body = json!({
        "Data": {
            "LIST": [
                {"ID": 9, "SYMBOL": "XYZ", "NAME": "Broken", "PRICE_USD": null},
                {"ID": 8, "SYMBOL": "HUGE", "NAME": "Huge", "PRICE_USD": 1e30},
                {"ID": 1, "SYMBOL": "BTC", "NAME": "Bitcoin", "PRICE_USD": 65000.0,
                 "PRICE_USD_LAST_UPDATE_TS": updated}
            ]
        },
        "Err": {}
    });

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let sample = client_for(&server, "BTC").fetch_latest().await.unwrap();

    assert_eq!(sample.symbol, "BTC");
    assert_eq!(sample.price, Decimal::from(65_000));
    assert_eq!(sample.timestamp, Utc.timestamp_opt(updated, 0).unwrap());
}

#[tokio::test]
async fn test_null_price_on_selected_symbol_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Data": {"LIST": [{"SYMBOL": "BTC", "NAME": "Bitcoin", "PRICE_USD": null}]}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, "BTC").fetch_latest().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Decode { .. }));
}

#[tokio::test]
async fn test_non_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client_for(&server, "BTC").fetch_latest().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Status { status: 503 }));
    assert_eq!(err.kind(), "status");
}

#[tokio::test]
async fn test_malformed_body_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server, "BTC").fetch_latest().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Decode { .. }));
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(top_list(1_000))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let err = client_for(&server, "BTC").fetch_latest().await.unwrap_err();
    assert!(matches!(err, PriceSourceError::Connection { .. }));
}
