//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceSource`: Fetches the latest upstream price sample

use async_trait::async_trait;

use crate::domain::sample::PriceSample;

/// Errors returned by a price source.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PriceSourceError {
    /// Request could not be sent or timed out.
    #[error("connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response body could not be decoded.
    #[error("failed to decode response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// The configured symbol was not part of the response.
    #[error("symbol {symbol} not found in upstream response")]
    SymbolNotFound {
        /// Requested symbol.
        symbol: String,
    },
}

impl PriceSourceError {
    /// Short label used for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::SymbolNotFound { .. } => "symbol_not_found",
        }
    }
}

/// Source of the latest price sample.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch one sample. A failure means no sample is produced for this tick.
    async fn fetch_latest(&self) -> Result<PriceSample, PriceSourceError>;
}
