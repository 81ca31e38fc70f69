#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Price Streamer - Rolling Price History and Fan-out
//!
//! Polls one upstream asset price on a fixed interval, keeps the most recent
//! samples in a fixed-capacity ring and pushes every new sample to all
//! connected stream clients without letting a slow client stall the rest.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core data types
//!   - `sample`: Immutable price observation
//!   - `history`: Fixed-capacity rolling history
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Upstream price source interface
//!   - `services`: Polling producer
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `broadcast`: Bounded per-subscriber fan-out with eviction
//!   - `coindesk`: Upstream HTTP client
//!   - `http`: REST, SSE and WebSocket endpoints
//!   - `health`: Health and metrics routes
//!   - `config`: Environment configuration
//!
//! # Data Flow
//!
//! ```text
//!                            ┌──────────────┐
//!                       ┌───►│ PriceHistory │◄──── /api/price/{current,history}
//! CoinDesk ──► Poller ──┤    └──────────────┘
//!                       │    ┌──────────────┐
//!                       └───►│ Broadcaster  │──┬─► SSE client 1
//!                            └──────────────┘  ├─► WS client 2
//!                                              └─► client N (evicted when full)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core price types with no transport dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::history::{CapacityError, PriceHistory};
pub use domain::sample::PriceSample;

// Application
pub use application::ports::{PriceSource, PriceSourceError};
pub use application::services::{PollerStatus, PricePoller};

// Broadcast
pub use infrastructure::broadcast::{
    BroadcastReport, Broadcaster, DEFAULT_QUEUE_CAPACITY, SharedBroadcaster, SharedSample,
    SubscriberId, Subscription,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, ServerSettings, SourceSettings, StreamSettings, StreamerConfig,
};

// Upstream client
pub use infrastructure::coindesk::{CoinDeskClient, CoinDeskError};

// HTTP server
pub use infrastructure::http::{ApiError, ApiServer, AppState, HttpServerError, router};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{
    LogFormat, TelemetryConfig, TelemetryGuard, init as init_telemetry,
};
