//! Price Sample
//!
//! A single timestamped price observation. Samples are plain values: two
//! samples with the same fields are the same sample.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One timestamped price observation with symbol metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    /// Observation time (second precision).
    pub timestamp: DateTime<Utc>,
    /// Price in USD.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    /// Asset ticker, e.g. `BTC`.
    pub symbol: String,
    /// Display name, e.g. `Bitcoin`.
    pub name: String,
}

impl PriceSample {
    /// Create a new sample.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        price: Decimal,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            price,
            symbol: symbol.into(),
            name: name.into(),
        }
    }

    /// Whether this sample was observed strictly after `since`.
    #[must_use]
    pub fn is_after(&self, since: DateTime<Utc>) -> bool {
        self.timestamp > since
    }
}
