//! Continuous-refill token bucket.

use parking_lot::Mutex;
use tokio::time::Instant;

/// Mutable accounting state, guarded by the bucket's own lock.
#[derive(Debug)]
struct BucketState {
    /// Tokens currently available, `0.0 ..= capacity`
    tokens: f64,
    /// Instant of the last accrual computation
    last_refill: Instant,
}

/// A token bucket that refills continuously at `refill_rate` tokens per second.
///
/// Tokens accrue fractionally between calls, so a full bucket admits a burst of
/// up to `capacity` requests and then settles to `refill_rate` requests per
/// second. The bucket is thread-safe; contention is limited to callers sharing
/// the same bucket.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum burst
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket seeded full.
    pub fn new(refill_rate: f64, capacity: u32) -> Self {
        Self::new_at(refill_rate, capacity, Instant::now())
    }

    /// Create a bucket seeded full, with `now` as its refill reference.
    pub fn new_at(refill_rate: f64, capacity: u32, now: Instant) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: now,
            }),
        }
    }

    /// Take one token if available.
    ///
    /// Returns `true` if the request is admitted, `false` if the bucket is empty.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Take one token if available, accruing refill up to `now`.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill(&mut state, now);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens available at `now`, without consuming any.
    pub fn available_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state, now);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState, now: Instant) {
        // An instant older than the last refill accrues nothing.
        let elapsed = now.saturating_duration_since(state.last_refill);
        let accrued = elapsed.as_secs_f64() * self.refill_rate;

        state.tokens = (state.tokens + accrued).min(self.capacity as f64);
        if now > state.last_refill {
            state.last_refill = now;
        }
    }
}
