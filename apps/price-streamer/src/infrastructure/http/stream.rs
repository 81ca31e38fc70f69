//! Streaming endpoints.
//!
//! Each connection subscribes to the broadcaster before reading its replay
//! snapshot, so no sample published in between is lost. A sample published
//! at that boundary may be delivered twice.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::stream::{self, SplitSink, Stream};
use futures::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use super::{AppState, ApiError, StreamParams, parse_since};
use crate::domain::sample::PriceSample;
use crate::infrastructure::broadcast::{SharedSample, SubscriberId, Subscription};
use crate::infrastructure::metrics::{self, Transport};

// =============================================================================
// Connection Accounting
// =============================================================================

/// Tracks one open streaming connection for metrics and logs.
struct ConnectionGuard {
    transport: Transport,
    subscriber: SubscriberId,
}

impl ConnectionGuard {
    fn open(transport: Transport, subscriber: SubscriberId, replayed: usize) -> Self {
        metrics::track_stream_connection(transport, 1.0);
        tracing::info!(%subscriber, ?transport, replayed, "Client connected");
        Self {
            transport,
            subscriber,
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        metrics::track_stream_connection(self.transport, -1.0);
        tracing::info!(
            subscriber = %self.subscriber,
            transport = ?self.transport,
            "Client disconnected"
        );
    }
}

/// Subscribe, then snapshot the replay for `since`.
fn open_subscription(
    state: &AppState,
    since: Option<DateTime<Utc>>,
) -> (Subscription, Vec<PriceSample>) {
    let subscription = state.broadcaster.subscribe();
    let replay = since
        .map(|since| state.history.updates_since(since))
        .unwrap_or_default();
    (subscription, replay)
}

/// Replay followed by live samples, ending on `shutdown` or eviction.
fn sample_stream(
    replay: Vec<PriceSample>,
    subscription: Subscription,
    guard: Option<ConnectionGuard>,
    shutdown: CancellationToken,
) -> impl Stream<Item = SharedSample> + Send + 'static {
    let replay = stream::iter(replay.into_iter().map(Arc::new));
    let live = stream::unfold(
        (subscription, guard),
        |(mut subscription, guard)| async move {
            let sample = subscription.recv().await?;
            Some((sample, (subscription, guard)))
        },
    );

    replay.chain(live).take_until(shutdown.cancelled_owned())
}

// =============================================================================
// Server-Sent Events
// =============================================================================

/// `GET /api/price/stream?since=`
pub(super) async fn sse_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let since = parse_since(params.since.as_deref())?;
    let (subscription, replay) = open_subscription(&state, since);
    let guard = ConnectionGuard::open(Transport::Sse, subscription.id(), replay.len());

    let events = sample_stream(replay, subscription, Some(guard), state.shutdown.clone())
        .map(|sample| Ok::<_, Infallible>(price_event(&sample)));

    let sse = Sse::new(events).keep_alive(KeepAlive::default());
    Ok(([(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")], sse).into_response())
}

fn price_event(sample: &PriceSample) -> Event {
    Event::default()
        .event("price")
        .json_data(sample)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to encode price event");
            Event::default().comment("encode error")
        })
}

// =============================================================================
// WebSocket
// =============================================================================

/// `GET /api/ws?since=`
pub(super) async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
) -> Result<Response, ApiError> {
    let since = parse_since(params.since.as_deref())?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, since)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, since: Option<DateTime<Utc>>) {
    let (subscription, replay) = open_subscription(&state, since);
    let id = subscription.id();
    let _guard = ConnectionGuard::open(Transport::WebSocket, id, replay.len());

    let (mut sink, mut source) = socket.split();
    let closed = state.shutdown.child_token();

    // Client frames are only logged; a close or read error ends the connection.
    let reader = tokio::spawn({
        let closed = closed.clone();
        async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => {
                        tracing::debug!(subscriber = %id, message = %text.as_str(), "Client message");
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            closed.cancel();
        }
    });

    let mut samples = sample_stream(replay, subscription, None, closed.clone()).boxed();
    while let Some(sample) = samples.next().await {
        if let Err(e) = send_sample(&mut sink, &sample).await {
            tracing::debug!(subscriber = %id, error = %e, "WebSocket send failed");
            break;
        }
    }

    if state.shutdown.is_cancelled() {
        let _ = sink.send(Message::Close(None)).await;
    }
    reader.abort();
}

async fn send_sample(
    sink: &mut SplitSink<WebSocket, Message>,
    sample: &PriceSample,
) -> Result<(), axum::Error> {
    match serde_json::to_string(sample) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode price message");
            Ok(())
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
