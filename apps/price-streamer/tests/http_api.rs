//! HTTP API Integration Tests
//!
//! Runs the real server on an ephemeral port and exercises the query,
//! streaming and health endpoints over the wire.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use price_streamer::{ApiServer, AppState, Broadcaster, PollerStatus, PriceHistory, PriceSample};

struct TestServer {
    addr: SocketAddr,
    history: Arc<PriceHistory>,
    broadcaster: Arc<Broadcaster>,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }
}

async fn setup_test_server(static_dir: Option<&std::path::Path>) -> TestServer {
    let history = Arc::new(PriceHistory::new(10).unwrap());
    let broadcaster = Arc::new(Broadcaster::new(4).unwrap());
    let shutdown = CancellationToken::new();

    let mut state = AppState::new(
        Arc::clone(&history),
        Arc::clone(&broadcaster),
        Arc::new(PollerStatus::new()),
        shutdown.clone(),
    );
    if let Some(dir) = static_dir {
        state = state.with_static_dir(dir);
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ApiServer::new(0, Arc::new(state), Duration::from_secs(1));
    let handle = tokio::spawn(async move {
        server.serve(listener).await.unwrap();
    });

    TestServer {
        addr,
        history,
        broadcaster,
        shutdown,
        handle,
    }
}

fn sample(secs: i64, price: i64) -> PriceSample {
    PriceSample::new(
        Utc.timestamp_opt(secs, 0).unwrap(),
        Decimal::from(price),
        "BTC",
        "Bitcoin",
    )
}

/// Read SSE chunks until one complete `price` event has arrived.
async fn next_price_event(response: &mut reqwest::Response, buffer: &mut String) -> PriceSample {
    loop {
        if let Some(end) = buffer.find("\n\n") {
            let frame: String = buffer.drain(..end + 2).collect();
            if !frame.contains("event: price") {
                continue;
            }
            let data = frame
                .lines()
                .find_map(|line| line.strip_prefix("data: "))
                .expect("price event carries data");
            return serde_json::from_str(data).unwrap();
        }

        let chunk = timeout(Duration::from_secs(2), response.chunk())
            .await
            .expect("event arrives in time")
            .unwrap()
            .expect("stream still open");
        buffer.push_str(std::str::from_utf8(&chunk).unwrap());
    }
}

// =============================================================================
// Query Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_current_price_empty_returns_404() {
    let server = setup_test_server(None).await;

    let response = reqwest::get(server.url("/api/price/current")).await.unwrap();
    assert_eq!(response.status(), 404);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No price data available");

    server.handle.abort();
}

#[tokio::test]
async fn test_current_price_returns_latest() {
    let server = setup_test_server(None).await;
    server.history.add(sample(100, 65_000));
    server.history.add(sample(101, 65_100));

    let response = reqwest::get(server.url("/api/price/current")).await.unwrap();
    assert_eq!(response.status(), 200);

    let current: PriceSample = response.json().await.unwrap();
    assert_eq!(current, sample(101, 65_100));

    server.handle.abort();
}

#[tokio::test]
async fn test_history_returns_all_without_since() {
    let server = setup_test_server(None).await;
    for secs in 1..=3 {
        server.history.add(sample(secs, secs * 10));
    }

    let body: Value = reqwest::get(server.url("/api/price/history"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["count"], 3);
    assert_eq!(body["updates"].as_array().unwrap().len(), 3);

    server.handle.abort();
}

#[tokio::test]
async fn test_history_since_is_strict() {
    let server = setup_test_server(None).await;
    for secs in 1..=4 {
        server.history.add(sample(secs, secs * 10));
    }

    let body: Value = reqwest::get(server.url("/api/price/history?since=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let updates: Vec<PriceSample> = serde_json::from_value(body["updates"].clone()).unwrap();
    assert_eq!(updates, vec![sample(3, 30), sample(4, 40)]);

    server.handle.abort();
}

#[tokio::test]
async fn test_history_limit_keeps_newest() {
    let server = setup_test_server(None).await;
    for secs in 1..=5 {
        server.history.add(sample(secs, secs * 10));
    }

    let body: Value = reqwest::get(server.url("/api/price/history?since=0&limit=2"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let updates: Vec<PriceSample> = serde_json::from_value(body["updates"].clone()).unwrap();
    assert_eq!(updates, vec![sample(4, 40), sample(5, 50)]);
    assert_eq!(body["count"], 2);

    server.handle.abort();
}

#[tokio::test]
async fn test_history_rejects_malformed_parameters() {
    let server = setup_test_server(None).await;

    for query in ["since=yesterday", "limit=0", "limit=many"] {
        let response = reqwest::get(server.url(&format!("/api/price/history?{query}")))
            .await
            .unwrap();
        assert_eq!(response.status(), 400, "query {query}");

        let body: Value = response.json().await.unwrap();
        assert!(body["error"].is_string());
    }

    server.handle.abort();
}

#[tokio::test]
async fn test_index_served_from_static_dir() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>prices</h1>").unwrap();
    let server = setup_test_server(Some(dir.path())).await;

    let response = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<h1>prices</h1>");

    server.handle.abort();
}

#[tokio::test]
async fn test_index_missing_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let server = setup_test_server(Some(dir.path())).await;

    let response = reqwest::get(server.url("/")).await.unwrap();
    assert_eq!(response.status(), 404);

    server.handle.abort();
}

// =============================================================================
// Server-Sent Events Tests
// =============================================================================

#[tokio::test]
async fn test_sse_delivers_live_samples() {
    let server = setup_test_server(None).await;

    let mut response = reqwest::get(server.url("/api/price/stream")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(
        response.headers()["access-control-allow-origin"]
            .to_str()
            .unwrap(),
        "*"
    );
    assert_eq!(
        response.headers()["cache-control"].to_str().unwrap(),
        "no-cache"
    );
    assert_eq!(server.broadcaster.subscriber_count(), 1);

    let report = server.broadcaster.broadcast(sample(10, 65_000));
    assert_eq!(report.delivered, 1);

    let mut buffer = String::new();
    let received = next_price_event(&mut response, &mut buffer).await;
    assert_eq!(received, sample(10, 65_000));

    server.handle.abort();
}

#[tokio::test]
async fn test_sse_replays_history_after_since() {
    let server = setup_test_server(None).await;
    for secs in 1..=3 {
        server.history.add(sample(secs, secs * 10));
    }

    let mut response = reqwest::get(server.url("/api/price/stream?since=1"))
        .await
        .unwrap();
    let mut buffer = String::new();

    assert_eq!(
        next_price_event(&mut response, &mut buffer).await,
        sample(2, 20)
    );
    assert_eq!(
        next_price_event(&mut response, &mut buffer).await,
        sample(3, 30)
    );

    server.broadcaster.broadcast(sample(4, 40));
    assert_eq!(
        next_price_event(&mut response, &mut buffer).await,
        sample(4, 40)
    );

    server.handle.abort();
}

#[tokio::test]
async fn test_sse_rejects_malformed_since() {
    let server = setup_test_server(None).await;

    let response = reqwest::get(server.url("/api/price/stream?since=abc"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    assert_eq!(server.broadcaster.subscriber_count(), 0);

    server.handle.abort();
}

#[tokio::test]
async fn test_sse_disconnect_unsubscribes() {
    let server = setup_test_server(None).await;

    let response = reqwest::get(server.url("/api/price/stream")).await.unwrap();
    assert_eq!(server.broadcaster.subscriber_count(), 1);

    drop(response);

    // The body is dropped once hyper notices the closed connection
    for _ in 0..50 {
        if server.broadcaster.subscriber_count() == 0 {
            break;
        }
        server.broadcaster.broadcast(sample(1, 1));
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.broadcaster.subscriber_count(), 0);

    server.handle.abort();
}

#[tokio::test]
async fn test_shutdown_ends_open_streams() {
    let server = setup_test_server(None).await;

    let mut response = reqwest::get(server.url("/api/price/stream")).await.unwrap();
    server.shutdown.cancel();

    let end = timeout(Duration::from_secs(2), async {
        while let Ok(Some(_)) = response.chunk().await {}
    })
    .await;
    assert!(end.is_ok(), "stream should end on shutdown");

    timeout(Duration::from_secs(3), server.handle)
        .await
        .expect("server stops")
        .unwrap();
}

// =============================================================================
// WebSocket Tests
// =============================================================================

#[tokio::test]
async fn test_websocket_replays_then_streams() {
    let server = setup_test_server(None).await;
    server.history.add(sample(1, 10));
    server.history.add(sample(2, 20));

    let (mut socket, _) =
        tokio_tungstenite::connect_async(format!("ws://{}/api/ws?since=1", server.addr))
            .await
            .unwrap();

    let next = |msg: tokio_tungstenite::tungstenite::Message| -> PriceSample {
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    };

    let first = timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(next(first), sample(2, 20));

    // Client frames are accepted and ignored
    socket
        .send(tokio_tungstenite::tungstenite::Message::text("hello"))
        .await
        .unwrap();

    server.broadcaster.broadcast(sample(3, 30));
    let live = timeout(Duration::from_secs(2), socket.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(next(live), sample(3, 30));

    socket.close(None).await.unwrap();

    for _ in 0..50 {
        if server.broadcaster.subscriber_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(server.broadcaster.subscriber_count(), 0);

    server.handle.abort();
}

// =============================================================================
// Health Tests
// =============================================================================

#[tokio::test]
async fn test_health_reports_unhealthy_without_samples() {
    let server = setup_test_server(None).await;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), 503);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["history"]["size"], 0);
    assert_eq!(body["history"]["capacity"], 10);
    assert_eq!(body["subscribers"], 0);

    let ready = reqwest::get(server.url("/readyz")).await.unwrap();
    assert_eq!(ready.status(), 503);
    assert_eq!(ready.text().await.unwrap(), "NOT READY");

    server.handle.abort();
}

#[tokio::test]
async fn test_health_with_samples() {
    let server = setup_test_server(None).await;
    server.history.add(sample(1, 10));

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    // No successful poll was recorded, so the sample counts as stale
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["history"]["size"], 1);

    let ready = reqwest::get(server.url("/readyz")).await.unwrap();
    assert_eq!(ready.status(), 200);

    let live = reqwest::get(server.url("/healthz")).await.unwrap();
    assert_eq!(live.text().await.unwrap(), "OK");

    server.handle.abort();
}
