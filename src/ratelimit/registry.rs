//! Registry of per-client token buckets.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use super::bucket::TokenBucket;

/// A single client's rate state.
#[derive(Debug)]
struct Visitor {
    /// The client's bucket; never shared with another identity
    bucket: Arc<TokenBucket>,
    /// Last time this client was resolved
    last_seen: Instant,
}

/// Concurrent mapping from client identity to its token bucket.
///
/// Locking: `visitors` guards insertion, `last_seen` updates, iteration and
/// removal. It is held for every operation that touches the map, including the
/// idle check during a sweep, so a refresh from [`resolve`](Self::resolve) can
/// never be lost to a concurrent sweep. Token arithmetic runs on the bucket's
/// own lock after `visitors` has been released.
pub struct VisitorRegistry {
    /// Per-identity visitors
    visitors: Mutex<HashMap<String, Visitor>>,
    /// Refill rate for every bucket this registry creates
    refill_rate: f64,
    /// Capacity for every bucket this registry creates
    capacity: u32,
}

impl VisitorRegistry {
    /// Create an empty registry whose buckets refill at `refill_rate` per second
    /// and hold at most `capacity` tokens.
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
            refill_rate,
            capacity,
        }
    }

    /// Get the bucket for `identity`, creating a full one on first sight.
    pub fn resolve(&self, identity: &str) -> Arc<TokenBucket> {
        self.resolve_at(identity, Instant::now())
    }

    /// Get the bucket for `identity` and mark it seen at `now`.
    ///
    /// Concurrent first-time callers for the same identity all receive the same
    /// bucket.
    pub fn resolve_at(&self, identity: &str, now: Instant) -> Arc<TokenBucket> {
        let mut visitors = self.visitors.lock();

        if let Some(visitor) = visitors.get_mut(identity) {
            visitor.last_seen = now;
            trace!(identity = %identity, "Visitor refreshed");
            return Arc::clone(&visitor.bucket);
        }

        debug!(
            identity = %identity,
            refill_rate = self.refill_rate,
            capacity = self.capacity,
            "Creating new visitor bucket"
        );
        let bucket = Arc::new(TokenBucket::new_at(self.refill_rate, self.capacity, now));
        visitors.insert(
            identity.to_string(),
            Visitor {
                bucket: Arc::clone(&bucket),
                last_seen: now,
            },
        );
        bucket
    }

    /// Remove every visitor idle for longer than `idle_threshold`.
    ///
    /// Returns the number of evicted visitors.
    pub fn sweep(&self, idle_threshold: Duration) -> usize {
        self.sweep_at(idle_threshold, Instant::now())
    }

    /// Remove every visitor whose last access is more than `idle_threshold`
    /// before `now`.
    pub fn sweep_at(&self, idle_threshold: Duration, now: Instant) -> usize {
        let mut visitors = self.visitors.lock();
        let before = visitors.len();

        visitors.retain(|_, visitor| {
            now.saturating_duration_since(visitor.last_seen) <= idle_threshold
        });

        let evicted = before - visitors.len();
        if evicted > 0 {
            info!(evicted, remaining = visitors.len(), "Evicted idle visitors");
        } else {
            debug!(remaining = visitors.len(), "Sweep found no idle visitors");
        }
        evicted
    }

    /// Check whether `identity` currently has a visitor entry.
    pub fn contains(&self, identity: &str) -> bool {
        self.visitors.lock().contains_key(identity)
    }

    /// Get the number of tracked visitors.
    pub fn len(&self) -> usize {
        self.visitors.lock().len()
    }

    /// Check whether no visitors are tracked.
    pub fn is_empty(&self) -> bool {
        self.visitors.lock().is_empty()
    }

    /// Get the refill rate applied to new buckets.
    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

impl std::fmt::Debug for VisitorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisitorRegistry")
            .field("visitors", &self.len())
            .field("refill_rate", &self.refill_rate)
            .field("capacity", &self.capacity)
            .finish()
    }
}
