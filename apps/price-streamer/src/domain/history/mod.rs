//! Rolling Price History
//!
//! Fixed-capacity circular buffer holding the most recent samples.
//!
//! # Design
//!
//! The buffer keeps three indices:
//! - `head`: the slot the next sample is written to
//! - `tail`: the slot holding the oldest retained sample
//! - `size`: how many slots are occupied
//!
//! Occupied slots, oldest to newest, are `tail, tail + 1, ..., tail + size - 1`
//! (mod capacity). Once `size == capacity` every append evicts exactly one
//! sample by advancing `tail` together with `head`.
//!
//! A single `RwLock` guards the buffer: queries share the read lock and never
//! block each other, appends take the write lock for a few index updates.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::sample::PriceSample;

// =============================================================================
// Errors
// =============================================================================

/// Rejected construction of a bounded buffer or queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CapacityError {
    /// Capacity must be at least one.
    #[error("{0} capacity must be at least 1")]
    Zero(&'static str),
}

// =============================================================================
// Ring Buffer
// =============================================================================

#[derive(Debug)]
struct Ring {
    slots: Vec<Option<PriceSample>>,
    head: usize,
    tail: usize,
    size: usize,
}

impl Ring {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            head: 0,
            tail: 0,
            size: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn push(&mut self, sample: PriceSample) {
        let capacity = self.capacity();
        self.slots[self.head] = Some(sample);
        self.head = (self.head + 1) % capacity;

        if self.size < capacity {
            self.size += 1;
        } else {
            self.tail = (self.tail + 1) % capacity;
        }
    }

    /// Occupied slots, oldest first.
    fn iter(&self) -> impl Iterator<Item = &PriceSample> {
        let capacity = self.capacity();
        (0..self.size).filter_map(move |i| self.slots[(self.tail + i) % capacity].as_ref())
    }

    fn latest(&self) -> Option<&PriceSample> {
        if self.size == 0 {
            return None;
        }
        let capacity = self.capacity();
        self.slots[(self.head + capacity - 1) % capacity].as_ref()
    }
}

// =============================================================================
// Price History
// =============================================================================

/// Thread-safe rolling history of price samples.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use price_streamer::{PriceHistory, PriceSample};
/// use rust_decimal::Decimal;
///
/// let history = PriceHistory::new(2).unwrap();
/// history.add(PriceSample::new(Utc::now(), Decimal::from(100), "BTC", "Bitcoin"));
///
/// assert_eq!(history.len(), 1);
/// assert_eq!(history.latest().unwrap().price, Decimal::from(100));
/// ```
#[derive(Debug)]
pub struct PriceHistory {
    ring: RwLock<Ring>,
}

impl PriceHistory {
    /// Create a history retaining at most `capacity` samples.
    ///
    /// # Errors
    ///
    /// Returns `CapacityError::Zero` if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 {
            return Err(CapacityError::Zero("history"));
        }
        Ok(Self {
            ring: RwLock::new(Ring::with_capacity(capacity)),
        })
    }

    /// Append a sample, evicting the oldest one when full.
    pub fn add(&self, sample: PriceSample) {
        let (size, capacity) = {
            let mut ring = self.ring.write();
            ring.push(sample);
            (ring.size, ring.capacity())
        };

        tracing::trace!(size, capacity, "Sample stored");
    }

    /// The most recently added sample, if any.
    #[must_use]
    pub fn latest(&self) -> Option<PriceSample> {
        self.ring.read().latest().cloned()
    }

    /// All retained samples observed strictly after `since`, oldest first.
    #[must_use]
    pub fn updates_since(&self, since: DateTime<Utc>) -> Vec<PriceSample> {
        let ring = self.ring.read();
        ring.iter()
            .filter(|sample| sample.is_after(since))
            .cloned()
            .collect()
    }

    /// All retained samples, oldest first.
    #[must_use]
    pub fn all_updates(&self) -> Vec<PriceSample> {
        let ring = self.ring.read();
        let mut updates = Vec::with_capacity(ring.size);
        updates.extend(ring.iter().cloned());
        updates
    }

    /// Samples matching an optional `since` filter.
    ///
    /// `None` means no filter; `Some(t)` behaves like [`Self::updates_since`].
    #[must_use]
    pub fn query(&self, since: Option<DateTime<Utc>>) -> Vec<PriceSample> {
        since.map_or_else(|| self.all_updates(), |t| self.updates_since(t))
    }

    /// Number of retained samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.read().size
    }

    /// Whether no sample has been added yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of retained samples.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.ring.read().capacity()
    }

    /// Index of the slot the next sample will be written to.
    #[must_use]
    pub fn head(&self) -> usize {
        self.ring.read().head
    }

    /// Index of the slot holding the oldest retained sample.
    #[must_use]
    pub fn tail(&self) -> usize {
        self.ring.read().tail
    }
}

// =============================================================================
// Tests
// =============================================================================
