//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PricePoller`: Periodically fetches a sample, stores it, then fans it out

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{PriceSource, PriceSourceError};
use crate::domain::history::PriceHistory;
use crate::infrastructure::broadcast::{BroadcastReport, Broadcaster};
use crate::infrastructure::metrics::{self, FetchOutcome};

// =============================================================================
// Poller Status
// =============================================================================

/// Observable state of the polling loop, read by the health endpoint.
#[derive(Debug, Default)]
pub struct PollerStatus {
    last_success: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    consecutive_failures: AtomicU32,
    total_fetches: AtomicU64,
}

impl PollerStatus {
    /// Create an empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn record_success(&self) {
        *self.last_success.write() = Some(Utc::now());
        *self.last_error.write() = None;
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self, error: &PriceSourceError) {
        *self.last_error.write() = Some(error.to_string());
        self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
        self.total_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Time of the last successful fetch.
    #[must_use]
    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        *self.last_success.read()
    }

    /// Message of the most recent failure, cleared by the next success.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Failures since the last success.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Fetch attempts so far.
    #[must_use]
    pub fn total_fetches(&self) -> u64 {
        self.total_fetches.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Price Poller
// =============================================================================

/// Timer-driven producer feeding the history and the broadcaster.
///
/// Each cycle fetches one sample, appends it to the history and then
/// broadcasts it. A failed fetch skips both steps. Cycles never overlap: a
/// slow fetch delays the next tick instead of running concurrently with it.
pub struct PricePoller {
    source: Arc<dyn PriceSource>,
    history: Arc<PriceHistory>,
    broadcaster: Arc<Broadcaster>,
    interval: Duration,
    status: Arc<PollerStatus>,
}

impl PricePoller {
    /// Create a poller.
    #[must_use]
    pub fn new(
        source: Arc<dyn PriceSource>,
        history: Arc<PriceHistory>,
        broadcaster: Arc<Broadcaster>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            history,
            broadcaster,
            interval,
            status: Arc::new(PollerStatus::new()),
        }
    }

    /// Shared status for health reporting.
    #[must_use]
    pub fn status(&self) -> Arc<PollerStatus> {
        Arc::clone(&self.status)
    }

    /// Poll immediately, then every interval, until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Starting price polling"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let _ = self.run_once().await;
                }
            }
        }

        tracing::info!("Stopping price polling");
    }

    /// Run a single fetch, store and broadcast cycle.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; in that case nothing was stored or broadcast.
    pub async fn run_once(&self) -> Result<BroadcastReport, PriceSourceError> {
        let started = Instant::now();
        let result = self.source.fetch_latest().await;
        let elapsed = started.elapsed();

        let sample = match result {
            Ok(sample) => sample,
            Err(e) => {
                metrics::record_fetch(FetchOutcome::Failure, elapsed);
                metrics::record_fetch_error(e.kind());
                self.status.record_failure(&e);
                tracing::error!(
                    error = %e,
                    consecutive_failures = self.status.consecutive_failures(),
                    "Failed to fetch price"
                );
                return Err(e);
            }
        };

        metrics::record_fetch(FetchOutcome::Success, elapsed);
        self.status.record_success();
        tracing::info!(
            symbol = %sample.symbol,
            price = %sample.price,
            timestamp = %sample.timestamp.to_rfc3339(),
            "Fetched price"
        );

        self.history.add(sample.clone());
        metrics::record_sample_stored(self.history.len());

        let report = self.broadcaster.broadcast(sample);
        tracing::debug!(
            delivered = report.delivered,
            evicted = report.evicted,
            "Sample broadcast"
        );

        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================
