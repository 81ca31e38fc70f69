//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Fetches**: Upstream poll outcomes, errors and latency
//! - **History**: Samples stored and current buffer size
//! - **Subscribers**: Active subscribers, deliveries and evictions
//! - **Connections**: Open SSE / WebSocket streams
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::infrastructure::broadcast::BroadcastReport;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Calling this again returns the handle installed by the first call.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "price_streamer_fetches_total",
        "Total upstream price fetch attempts by outcome"
    );
    describe_counter!(
        "price_streamer_fetch_errors_total",
        "Total upstream price fetch failures by error type"
    );
    describe_histogram!(
        "price_streamer_fetch_duration_seconds",
        "Time to fetch and decode one upstream price"
    );

    describe_counter!(
        "price_streamer_samples_stored_total",
        "Total samples appended to the rolling history"
    );
    describe_gauge!(
        "price_streamer_history_size",
        "Number of samples currently retained"
    );

    describe_gauge!(
        "price_streamer_subscribers",
        "Number of registered live subscribers"
    );
    describe_counter!(
        "price_streamer_samples_delivered_total",
        "Total samples enqueued to subscriber queues"
    );
    describe_counter!(
        "price_streamer_subscribers_evicted_total",
        "Total subscribers evicted because their queue was full"
    );

    describe_gauge!(
        "price_streamer_stream_connections",
        "Number of open streaming connections by transport"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for fetch outcomes.
#[derive(Debug, Clone, Copy)]
pub enum FetchOutcome {
    /// Sample fetched and pushed.
    Success,
    /// Fetch failed; nothing was pushed.
    Failure,
}

impl FetchOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// Metric labels for streaming transports.
#[derive(Debug, Clone, Copy)]
pub enum Transport {
    /// Server-Sent Events.
    Sse,
    /// WebSocket.
    WebSocket,
}

impl Transport {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::WebSocket => "websocket",
        }
    }
}

/// Record one upstream fetch attempt.
pub fn record_fetch(outcome: FetchOutcome, duration: Duration) {
    counter!(
        "price_streamer_fetches_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
    histogram!("price_streamer_fetch_duration_seconds").record(duration.as_secs_f64());
}

/// Record an upstream fetch error.
pub fn record_fetch_error(error_type: &'static str) {
    counter!(
        "price_streamer_fetch_errors_total",
        "error_type" => error_type
    )
    .increment(1);
}

/// Record a sample stored in the history.
#[allow(clippy::cast_precision_loss)]
pub fn record_sample_stored(history_size: usize) {
    counter!("price_streamer_samples_stored_total").increment(1);
    gauge!("price_streamer_history_size").set(history_size as f64);
}

/// Update the registered subscriber count.
#[allow(clippy::cast_precision_loss)]
pub fn set_subscribers(count: usize) {
    gauge!("price_streamer_subscribers").set(count as f64);
}

/// Record the outcome of one broadcast.
pub fn record_broadcast(report: &BroadcastReport) {
    if report.delivered > 0 {
        counter!("price_streamer_samples_delivered_total").increment(report.delivered as u64);
    }
    if report.evicted > 0 {
        counter!("price_streamer_subscribers_evicted_total").increment(report.evicted as u64);
    }
}

/// Track a streaming connection opening (`delta = 1.0`) or closing (`-1.0`).
pub fn track_stream_connection(transport: Transport, delta: f64) {
    gauge!(
        "price_streamer_stream_connections",
        "transport" => transport.as_str()
    )
    .increment(delta);
}

// =============================================================================
// Tests
// =============================================================================
