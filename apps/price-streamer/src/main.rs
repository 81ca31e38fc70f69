//! Price Streamer Binary
//!
//! Starts the poller and the HTTP server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin price-streamer
//! ```
//!
//! # Environment Variables
//!
//! All optional.
//! - `PORT`: HTTP port (default: 8080)
//! - `STORAGE_CAPACITY`: Retained samples (default: 1000)
//! - `CLIENT_BUFFER_SIZE`: Per-subscriber queue capacity (default: 50)
//! - `POLL_INTERVAL_SECS`: Upstream poll interval (default: 5)
//! - `COINDESK_API_URL`: Upstream endpoint
//! - `PRICE_SYMBOL`: Asset symbol (default: BTC)
//! - `FETCH_TIMEOUT_SECS`: Upstream request timeout (default: 10)
//! - `STALE_AFTER_SECS`: Upstream timestamp staleness bound (default: 3600)
//! - `STATIC_DIR`: Directory holding `index.html` (default: ./static)
//! - `SHUTDOWN_TIMEOUT_SECS`: Connection drain timeout (default: 30)
//! - `LOG_FORMAT`: text | json (default: text)
//! - `OTEL_ENABLED`: Enable OpenTelemetry export (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;

use anyhow::Context;
use price_streamer::infrastructure::telemetry;
use price_streamer::{
    ApiServer, AppState, Broadcaster, CoinDeskClient, PriceHistory, PricePoller, StreamerConfig,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Price Streamer");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder unavailable, /metrics disabled");
    }

    let config = StreamerConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let history = Arc::new(
        PriceHistory::new(config.stream.history_capacity).context("invalid history capacity")?,
    );
    let broadcaster = Arc::new(
        Broadcaster::new(config.stream.client_buffer_size).context("invalid client buffer size")?,
    );

    let source = CoinDeskClient::new(&config.source).context("failed to build price source")?;
    let poller = PricePoller::new(
        Arc::new(source),
        Arc::clone(&history),
        Arc::clone(&broadcaster),
        config.stream.poll_interval,
    );

    let state = AppState::new(
        Arc::clone(&history),
        Arc::clone(&broadcaster),
        poller.status(),
        shutdown_token.clone(),
    )
    .with_static_dir(config.server.static_dir.clone())
    .with_poll_interval(config.stream.poll_interval);

    // Spawn poller
    let poller_shutdown = shutdown_token.clone();
    let poller_task = tokio::spawn(async move {
        poller.run(poller_shutdown).await;
    });

    // Spawn HTTP server
    let server = ApiServer::new(
        config.server.port,
        Arc::new(state),
        config.server.shutdown_timeout,
    );
    let server_shutdown = shutdown_token.clone();
    let server_task = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "HTTP server error");
            server_shutdown.cancel();
        }
    });

    tracing::info!("Price streamer ready");

    tokio::select! {
        () = await_shutdown() => {}
        () = shutdown_token.cancelled() => {
            tracing::warn!("Shutting down after server failure");
        }
    }
    shutdown_token.cancel();

    let _ = poller_task.await;
    let _ = server_task.await;

    tracing::info!(
        subscribers = broadcaster.subscriber_count(),
        retained = history.len(),
        "Price streamer stopped"
    );
    Ok(())
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &StreamerConfig) {
    tracing::info!(
        port = config.server.port,
        symbol = %config.source.symbol,
        history_capacity = config.stream.history_capacity,
        client_buffer_size = config.stream.client_buffer_size,
        poll_interval_secs = config.stream.poll_interval.as_secs(),
        "Configuration loaded"
    );
    tracing::debug!(
        api_url = %config.source.api_url,
        static_dir = %config.server.static_dir.display(),
        "Endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }
}
