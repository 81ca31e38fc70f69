//! Subscriber Broadcast
//!
//! Fans every price sample out to a dynamic set of subscribers, each with its
//! own bounded `tokio::sync::mpsc` queue.
//!
//! # Backpressure
//!
//! The producer never waits on a subscriber. `broadcast` uses `try_send` on
//! every queue; a subscriber whose queue is full is evicted in the same call.
//! Removing the `Sender` from the registry closes the queue, so an evicted or
//! unsubscribed queue can never be written to again. Its consumer drains what
//! is already buffered and then observes the end of the stream.
//!
//! # Lifecycle
//!
//! ```text
//!            subscribe()
//!                 │
//!                 ▼
//!   ┌──────────────────────────┐
//!   │          Active          │
//!   └──────────────────────────┘
//!      │ queue full          │ unsubscribe() / Subscription dropped
//!      ▼                     ▼
//!   Evicted               Closed
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::domain::history::CapacityError;
use crate::domain::sample::PriceSample;
use crate::infrastructure::metrics;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

// =============================================================================
// Types
// =============================================================================

/// Sample shared between all subscriber queues of one broadcast.
pub type SharedSample = Arc<PriceSample>;

/// Opaque handle identifying one registered subscriber queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that received the sample.
    pub delivered: usize,
    /// Subscribers evicted because their queue was full.
    pub evicted: usize,
    /// Subscribers removed because their consumer had already gone away.
    pub disconnected: usize,
}

// =============================================================================
// Broadcaster
// =============================================================================

/// Registry of live subscriber queues with non-blocking fan-out.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
///
/// use chrono::Utc;
/// use price_streamer::{Broadcaster, PriceSample};
/// use rust_decimal::Decimal;
///
/// # tokio_test::block_on(async {
/// let broadcaster = Arc::new(Broadcaster::new(8).unwrap());
/// let mut subscription = broadcaster.subscribe();
///
/// let report = broadcaster.broadcast(PriceSample::new(
///     Utc::now(),
///     Decimal::from(100),
///     "BTC",
///     "Bitcoin",
/// ));
/// assert_eq!(report.delivered, 1);
///
/// let sample = subscription.recv().await.unwrap();
/// assert_eq!(sample.price, Decimal::from(100));
/// # });
/// ```
pub struct Broadcaster {
    queue_capacity: usize,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<SharedSample>>>,
}

impl Broadcaster {
    /// Create a broadcaster whose subscriber queues hold `queue_capacity` samples.
    ///
    /// # Errors
    ///
    /// Returns `CapacityError::Zero` if `queue_capacity` is zero.
    pub fn new(queue_capacity: usize) -> Result<Self, CapacityError> {
        if queue_capacity == 0 {
            return Err(CapacityError::Zero("subscriber queue"));
        }
        Ok(Self {
            queue_capacity,
            subscribers: Mutex::new(HashMap::new()),
        })
    }

    /// Create a broadcaster with the default queue capacity.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new subscriber queue.
    ///
    /// The returned [`Subscription`] is the only consumer of the queue and
    /// unsubscribes itself when dropped.
    #[must_use]
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let id = SubscriberId::new();

        // The gauge is written under the lock so concurrent updates stay ordered.
        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, tx);
            let count = subscribers.len();
            metrics::set_subscribers(count);
            count
        };

        tracing::info!(
            subscriber_id = %id,
            queue_capacity = self.queue_capacity,
            total = count,
            "Subscriber added"
        );

        Subscription {
            id,
            rx,
            broadcaster: Arc::clone(self),
        }
    }

    /// Remove a subscriber and close its queue.
    ///
    /// Returns `false` if the handle was already removed (unsubscribed or
    /// evicted); calling this more than once is harmless.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let (removed, count) = {
            let mut subscribers = self.subscribers.lock();
            let removed = subscribers.remove(&id);
            if removed.is_some() {
                metrics::set_subscribers(subscribers.len());
            }
            (removed, subscribers.len())
        };

        // Dropping the sender outside the lock closes the queue.
        let Some(tx) = removed else {
            return false;
        };
        drop(tx);

        tracing::info!(subscriber_id = %id, total = count, "Subscriber removed");
        true
    }

    /// Deliver a sample to every registered subscriber without blocking.
    ///
    /// Subscribers whose queue is full are evicted. This never fails as a
    /// whole; the report only describes what happened.
    pub fn broadcast(&self, sample: PriceSample) -> BroadcastReport {
        let sample: SharedSample = Arc::new(sample);
        let mut report = BroadcastReport::default();
        let mut evicted = Vec::new();

        {
            let mut subscribers = self.subscribers.lock();
            subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&sample)) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    report.evicted += 1;
                    evicted.push(*id);
                    false
                }
                Err(TrySendError::Closed(_)) => {
                    report.disconnected += 1;
                    false
                }
            });
            if report.evicted > 0 || report.disconnected > 0 {
                metrics::set_subscribers(subscribers.len());
            }
        }

        for id in evicted {
            tracing::warn!(
                subscriber_id = %id,
                queue_capacity = self.queue_capacity,
                "Evicting slow subscriber"
            );
        }

        metrics::record_broadcast(&report);

        report
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().contains_key(&id)
    }

    /// Per-subscriber queue capacity.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("queue_capacity", &self.queue_capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Shared broadcaster reference.
pub type SharedBroadcaster = Arc<Broadcaster>;

// =============================================================================
// Subscription
// =============================================================================

/// Consumer side of one subscriber queue.
///
/// Dropping the subscription unsubscribes it, so every exit path of a
/// connection task releases its slot exactly once.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<SharedSample>,
    broadcaster: Arc<Broadcaster>,
}

impl Subscription {
    /// Handle of this subscription.
    #[must_use]
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next sample.
    ///
    /// Returns `None` once the subscription was evicted or unsubscribed and
    /// every buffered sample has been received.
    pub async fn recv(&mut self) -> Option<SharedSample> {
        self.rx.recv().await
    }

    /// Wait for the next sample or for `cancel` to fire, whichever is first.
    pub async fn recv_or_cancel(&mut self, cancel: &CancellationToken) -> Option<SharedSample> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            sample = self.rx.recv() => sample,
        }
    }

    /// Take a buffered sample without waiting.
    pub fn try_recv(&mut self) -> Option<SharedSample> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
