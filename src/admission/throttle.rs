//! Global, identity-agnostic concurrency throttle with a bounded backlog.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use crate::error::AdmissionError;

/// Caps in-flight work at `rate`, queueing up to `backlog_limit` more.
///
/// A request first claims a backlog slot without waiting; when none is left it
/// is rejected at once with [`AdmissionError::BacklogFull`]. It then waits for
/// one of the `rate` work slots for at most `backlog_timeout`, failing with
/// [`AdmissionError::BacklogTimeout`] if none frees up in time.
#[derive(Debug, Clone)]
pub struct GlobalThrottle {
    /// Work slots, one per in-flight request
    work: Arc<Semaphore>,
    /// In-flight plus queued slots
    backlog: Arc<Semaphore>,
    rate: usize,
    backlog_limit: usize,
    backlog_timeout: Duration,
}

/// Proof of a claimed work slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct ThrottlePermit {
    _work: OwnedSemaphorePermit,
    _backlog: OwnedSemaphorePermit,
}

impl GlobalThrottle {
    /// Create a throttle with `rate` concurrent slots and room for
    /// `backlog_limit` waiting requests.
    ///
    /// Both sizes are capped at [`Semaphore::MAX_PERMITS`]; use
    /// [`GlobalThrottle::check_limits`] to reject such settings up front.
    pub fn new(rate: usize, backlog_limit: usize, backlog_timeout: Duration) -> Self {
        let rate = rate.min(Semaphore::MAX_PERMITS);
        let total = rate
            .saturating_add(backlog_limit)
            .min(Semaphore::MAX_PERMITS);

        Self {
            work: Arc::new(Semaphore::new(rate)),
            backlog: Arc::new(Semaphore::new(total)),
            rate,
            backlog_limit: total - rate,
            backlog_timeout,
        }
    }

    /// Check that `rate` running plus `backlog_limit` queued requests fit in
    /// a semaphore.
    pub fn check_limits(rate: usize, backlog_limit: usize) -> Result<(), String> {
        match rate.checked_add(backlog_limit) {
            Some(total) if total <= Semaphore::MAX_PERMITS => Ok(()),
            _ => Err(format!(
                "throttle rate ({}) plus backlog limit ({}) exceeds {}",
                rate,
                backlog_limit,
                Semaphore::MAX_PERMITS
            )),
        }
    }

    /// Claim a work slot, queueing in the backlog if all slots are busy.
    pub async fn acquire(&self) -> Result<ThrottlePermit, AdmissionError> {
        let backlog = match Arc::clone(&self.backlog).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                info!(
                    rate = self.rate,
                    backlog_limit = self.backlog_limit,
                    "Request backlog full, shedding request"
                );
                return Err(AdmissionError::BacklogFull);
            }
        };

        let acquire = Arc::clone(&self.work).acquire_owned();
        match tokio::time::timeout(self.backlog_timeout, acquire).await {
            Ok(Ok(work)) => Ok(ThrottlePermit {
                _work: work,
                _backlog: backlog,
            }),
            // The semaphores are never closed, so this arm only guards the type.
            Ok(Err(_)) => Err(AdmissionError::BacklogFull),
            Err(_) => {
                debug!(timeout = ?self.backlog_timeout, "Request timed out in backlog");
                Err(AdmissionError::BacklogTimeout)
            }
        }
    }

    /// Number of work slots currently free.
    pub fn available(&self) -> usize {
        self.work.available_permits()
    }

    /// Number of requests currently holding or waiting for a slot.
    pub fn pending(&self) -> usize {
        (self.rate + self.backlog_limit).saturating_sub(self.backlog.available_permits())
    }

    /// Get the configured concurrency cap.
    pub fn rate(&self) -> usize {
        self.rate
    }

    /// Get the configured backlog limit.
    pub fn backlog_limit(&self) -> usize {
        self.backlog_limit
    }

    /// Get the configured backlog timeout.
    pub fn backlog_timeout(&self) -> Duration {
        self.backlog_timeout
    }
}
