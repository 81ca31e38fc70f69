//! CoinDesk price source adapter.
//!
//! Implements `PriceSource` against the CoinDesk "top list" asset endpoint,
//! which returns a page of assets with their latest USD price.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::sample::PriceSample;
use crate::infrastructure::config::SourceSettings;

/// CoinDesk client errors.
#[derive(Debug, thiserror::Error)]
pub enum CoinDeskError {
    /// HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// CoinDesk price source.
#[derive(Debug)]
pub struct CoinDeskClient {
    client: reqwest::Client,
    api_url: String,
    symbol: String,
    stale_after: Duration,
}

impl CoinDeskClient {
    /// Create a new client from source settings.
    pub fn new(settings: &SourceSettings) -> Result<Self, CoinDeskError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| CoinDeskError::Client(e.to_string()))?;

        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            symbol: settings.symbol.clone(),
            stale_after: settings.stale_after,
        })
    }

    async fn fetch_list(&self) -> Result<TopListResponse, PriceSourceError> {
        let response = self
            .client
            .get(&self.api_url)
            .send()
            .await
            .map_err(|e| PriceSourceError::Connection {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PriceSourceError::Status {
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| PriceSourceError::Decode {
                message: e.to_string(),
            })
    }

    fn to_sample(&self, asset: AssetData, now: DateTime<Utc>) -> PriceSample {
        let timestamp = asset
            .price_usd_last_update_ts
            .map_or(now, |secs| resolve_timestamp(secs, now, self.stale_after));
        PriceSample::new(timestamp, asset.price_usd, asset.symbol, asset.name)
    }
}

/// Decode the entry for `symbol`, leaving every other entry untouched.
fn select_asset(
    list: Vec<serde_json::Value>,
    symbol: &str,
) -> Result<AssetData, PriceSourceError> {
    let entry = list
        .into_iter()
        .find(|entry| entry.get("SYMBOL").and_then(serde_json::Value::as_str) == Some(symbol))
        .ok_or_else(|| PriceSourceError::SymbolNotFound {
            symbol: symbol.to_string(),
        })?;

    serde_json::from_value(entry).map_err(|e| PriceSourceError::Decode {
        message: format!("{symbol}: {e}"),
    })
}

#[async_trait]
impl PriceSource for CoinDeskClient {
    async fn fetch_latest(&self) -> Result<PriceSample, PriceSourceError> {
        let response = self.fetch_list().await?;
        let asset = select_asset(response.data.list, &self.symbol)?;

        Ok(self.to_sample(asset, Utc::now()))
    }
}

/// Upstream update time, or `now` if it is missing, invalid or stale.
fn resolve_timestamp(unix_secs: i64, now: DateTime<Utc>, stale_after: Duration) -> DateTime<Utc> {
    let Some(timestamp) = Utc.timestamp_opt(unix_secs, 0).single() else {
        return now;
    };

    let stale = chrono::Duration::from_std(stale_after).unwrap_or(chrono::Duration::MAX);
    if now.signed_duration_since(timestamp) > stale {
        now
    } else {
        timestamp
    }
}

// API response types

#[derive(Debug, Deserialize)]
struct TopListResponse {
    #[serde(rename = "Data")]
    data: TopListData,
}

#[derive(Debug, Deserialize)]
struct TopListData {
    // Entries stay raw so one malformed asset cannot fail the whole page.
    #[serde(rename = "LIST", default)]
    list: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AssetData {
    #[serde(rename = "SYMBOL")]
    symbol: String,
    #[serde(rename = "NAME", default)]
    name: String,
    #[serde(rename = "PRICE_USD", with = "rust_decimal::serde::float")]
    price_usd: Decimal,
    #[serde(rename = "PRICE_USD_LAST_UPDATE_TS", default)]
    price_usd_last_update_ts: Option<i64>,
}
