//! HTTP API Server
//!
//! Axum server exposing the price history and the live stream.
//!
//! # Endpoints
//!
//! - `GET /` - Static dashboard page (`index.html`)
//! - `GET /api/price/current` - Latest sample
//! - `GET /api/price/history?since=&limit=` - Retained samples
//! - `GET /api/price/stream?since=` - Server-Sent Events stream
//! - `GET /api/ws?since=` - WebSocket stream
//! - Health and metrics routes, see [`crate::infrastructure::health`]
//!
//! # `since` Parameter
//!
//! `since` is an optional Unix timestamp in seconds. It is parsed the same way
//! everywhere: a malformed value is rejected with 400. When it is absent the
//! history endpoint returns everything it retains and the streaming
//! endpoints skip the replay; when present every endpoint returns exactly the
//! retained samples observed strictly after it.

mod query;
mod stream;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use query::{DEFAULT_HISTORY_LIMIT, HistoryParams, StreamParams, parse_limit, parse_since};

use crate::application::services::PollerStatus;
use crate::domain::history::PriceHistory;
use crate::domain::sample::PriceSample;
use crate::infrastructure::broadcast::Broadcaster;
use crate::infrastructure::health;

// =============================================================================
// Shared State
// =============================================================================

/// State shared by all HTTP handlers.
#[derive(Debug)]
pub struct AppState {
    pub(crate) history: Arc<PriceHistory>,
    pub(crate) broadcaster: Arc<Broadcaster>,
    pub(crate) poller_status: Arc<PollerStatus>,
    pub(crate) poll_interval: Duration,
    pub(crate) static_dir: PathBuf,
    pub(crate) shutdown: CancellationToken,
    pub(crate) version: String,
    pub(crate) started_at: Instant,
}

impl AppState {
    /// Create handler state.
    ///
    /// `shutdown` ends every open stream when cancelled.
    #[must_use]
    pub fn new(
        history: Arc<PriceHistory>,
        broadcaster: Arc<Broadcaster>,
        poller_status: Arc<PollerStatus>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            history,
            broadcaster,
            poller_status,
            poll_interval: Duration::from_secs(5),
            static_dir: PathBuf::from("./static"),
            shutdown,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        }
    }

    /// Set the directory `index.html` is served from.
    #[must_use]
    pub fn with_static_dir(mut self, static_dir: impl Into<PathBuf>) -> Self {
        self.static_dir = static_dir.into();
        self
    }

    /// Set the producer interval used to judge sample freshness.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the complete application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/price/current", get(current_price_handler))
        .route("/api/price/history", get(history_handler))
        .route("/api/price/stream", get(stream::sse_handler))
        .route("/api/ws", get(stream::ws_handler))
        .merge(health::routes())
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// HTTP API server.
pub struct ApiServer {
    port: u16,
    state: Arc<AppState>,
    shutdown_timeout: Duration,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<AppState>, shutdown_timeout: Duration) -> Self {
        Self {
            port,
            state,
            shutdown_timeout,
        }
    }

    /// Run the server until the shared shutdown token is cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");
        self.serve(listener).await
    }

    /// Serve on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError::ServerFailed` on a fatal server error.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HttpServerError> {
        let cancel = self.state.shutdown.clone();
        let app = router(Arc::clone(&self.state));

        let server = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future();

        let drain_deadline = async {
            cancel.cancelled().await;
            tokio::time::sleep(self.shutdown_timeout).await;
        };

        tokio::select! {
            result = server => {
                result.map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;
            }
            () = drain_deadline => {
                tracing::warn!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Graceful shutdown timed out, dropping open connections"
                );
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Handlers
// =============================================================================

async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>, ApiError> {
    let path = state.static_dir.join("index.html");
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => Ok(Html(body)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Index page unavailable");
            Err(ApiError::NotFound("Page not found".to_string()))
        }
    }
}

async fn current_price_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PriceSample>, ApiError> {
    state
        .history
        .latest()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No price data available".to_string()))
}

/// Body of `GET /api/price/history`.
#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    /// Samples, oldest first.
    pub updates: Vec<PriceSample>,
    /// Number of samples returned.
    pub count: usize,
}

async fn history_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let since = parse_since(params.since.as_deref())?;
    let limit = parse_limit(params.limit.as_deref())?;

    let mut updates = state.history.query(since);
    if updates.len() > limit {
        updates.drain(..updates.len() - limit);
    }

    Ok(Json(HistoryResponse {
        count: updates.len(),
        updates,
    }))
}

// =============================================================================
// Errors
// =============================================================================

/// Error returned to HTTP clients as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request parameter.
    #[error("{0}")]
    BadRequest(String),
    /// Requested resource does not exist.
    #[error("{0}")]
    NotFound(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
