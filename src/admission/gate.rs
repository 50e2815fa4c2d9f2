//! The admission gate consulted before any protected work runs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::identity::ClientIdentity;
use super::throttle::{GlobalThrottle, ThrottlePermit};
use crate::error::AdmissionError;
use crate::ratelimit::VisitorRegistry;

/// Outcome of a per-client rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The client had a token to spend
    Admitted,
    /// The client's bucket is empty
    Denied,
}

/// An admitted request.
///
/// Holds the global throttle slot, if any, for as long as the protected work
/// runs; drop it when the work is done.
#[derive(Debug)]
pub struct AdmissionTicket {
    identity: ClientIdentity,
    _permit: Option<ThrottlePermit>,
}

impl AdmissionTicket {
    /// The identity the request was admitted under.
    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }
}

/// Combines the optional global throttle with the per-client buckets.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    registry: Arc<VisitorRegistry>,
    throttle: Option<GlobalThrottle>,
}

impl AdmissionGate {
    /// Create a gate that only applies per-client limits.
    pub fn new(registry: Arc<VisitorRegistry>) -> Self {
        Self {
            registry,
            throttle: None,
        }
    }

    /// Put a global throttle in front of the per-client check.
    pub fn with_throttle(mut self, throttle: GlobalThrottle) -> Self {
        info!(
            rate = throttle.rate(),
            backlog_limit = throttle.backlog_limit(),
            backlog_timeout = ?throttle.backlog_timeout(),
            "Global throttle enabled"
        );
        self.throttle = Some(throttle);
        self
    }

    /// Get the registry backing this gate.
    pub fn registry(&self) -> &Arc<VisitorRegistry> {
        &self.registry
    }

    /// Get the global throttle, if one is configured.
    pub fn throttle(&self) -> Option<&GlobalThrottle> {
        self.throttle.as_ref()
    }

    /// How long a rate-limited client should wait before one token has
    /// refilled, rounded up to whole seconds.
    ///
    /// `None` when buckets never refill.
    pub fn retry_after(&self) -> Option<Duration> {
        let rate = self.registry.refill_rate();
        if rate.is_nan() || rate <= 0.0 {
            return None;
        }
        let secs = (1.0 / rate).ceil() as u64;
        Some(Duration::from_secs(secs.max(1)))
    }

    /// Resolve the client's bucket and spend one token from it.
    pub fn check(&self, identity: &ClientIdentity) -> Decision {
        let bucket = self.registry.resolve(identity.as_str());

        if bucket.allow() {
            trace!(identity = %identity, "Request admitted");
            Decision::Admitted
        } else {
            info!(identity = %identity, "Rate limit exceeded");
            Decision::Denied
        }
    }

    /// Run the full admission sequence for a request from `remote_addr`.
    pub async fn admit(&self, remote_addr: &str) -> Result<AdmissionTicket, AdmissionError> {
        let identity = ClientIdentity::from_remote_addr(remote_addr).map_err(|e| {
            debug!(remote_addr = %remote_addr, error = %e, "Rejecting unparsable client address");
            e
        })?;
        self.admit_identity(identity).await
    }

    /// Run the admission sequence for an already extracted identity.
    pub async fn admit_identity(
        &self,
        identity: ClientIdentity,
    ) -> Result<AdmissionTicket, AdmissionError> {
        let permit = match &self.throttle {
            Some(throttle) => Some(throttle.acquire().await?),
            None => None,
        };

        match self.check(&identity) {
            Decision::Admitted => Ok(AdmissionTicket {
                identity,
                _permit: permit,
            }),
            Decision::Denied => Err(AdmissionError::RateLimitExceeded),
        }
    }
}
