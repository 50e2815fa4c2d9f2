//! Page call counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counts admitted page calls.
///
/// Recording is a single relaxed atomic add; it shares no locks with the
/// admission path and is only called after a request has been admitted.
#[derive(Debug, Default)]
pub struct PageCalls {
    total: AtomicU64,
}

impl PageCalls {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one admitted page call.
    pub fn record(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the number of recorded calls.
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}
