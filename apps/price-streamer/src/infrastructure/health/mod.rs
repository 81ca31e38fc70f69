//! Health Check and Metrics Endpoints
//!
//! Health, readiness and Prometheus routes, merged into the main API router.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (a sample is available)
//! - `GET /metrics` - Prometheus metrics in text format

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::infrastructure::http::AppState;
use crate::infrastructure::metrics::get_metrics_handle;

/// A producer that has not succeeded for this many intervals is degraded.
const STALE_INTERVALS: u32 = 3;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// History occupancy.
    pub history: HistoryStatus,
    /// Registered stream subscribers.
    pub subscribers: usize,
    /// Producer status.
    pub poller: PollerInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Samples are fresh.
    Healthy,
    /// Samples exist but the producer is falling behind.
    Degraded,
    /// No sample has ever been stored.
    Unhealthy,
}

/// History occupancy.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HistoryStatus {
    /// Retained samples.
    pub size: usize,
    /// Maximum retained samples.
    pub capacity: usize,
}

/// Producer status.
#[derive(Debug, Clone, Serialize)]
pub struct PollerInfo {
    /// Time of the last successful fetch.
    pub last_success: Option<DateTime<Utc>>,
    /// Failed fetches since the last success.
    pub consecutive_failures: u32,
    /// Most recent fetch error.
    pub last_error: Option<String>,
}

// =============================================================================
// Routes
// =============================================================================

/// Health and metrics routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = build_health_response(&state, Utc::now());
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.history.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &AppState, now: DateTime<Utc>) -> HealthResponse {
    let poller = &state.poller_status;
    let last_success = poller.last_success();

    HealthResponse {
        status: determine_health_status(
            !state.history.is_empty(),
            last_success,
            now,
            state.poll_interval,
        ),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        history: HistoryStatus {
            size: state.history.len(),
            capacity: state.history.capacity(),
        },
        subscribers: state.broadcaster.subscriber_count(),
        poller: PollerInfo {
            last_success,
            consecutive_failures: poller.consecutive_failures(),
            last_error: poller.last_error(),
        },
    }
}

fn determine_health_status(
    has_sample: bool,
    last_success: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    poll_interval: Duration,
) -> HealthStatus {
    if !has_sample {
        return HealthStatus::Unhealthy;
    }

    let window = chrono::Duration::from_std(poll_interval.saturating_mul(STALE_INTERVALS))
        .unwrap_or(chrono::Duration::MAX);

    match last_success {
        Some(at) if now.signed_duration_since(at) <= window => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Tests
// =============================================================================
