//! Configuration management for Pagegate.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::admission::GlobalThrottle;
use crate::error::{PagegateError, Result};

/// Main configuration for the Pagegate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagegateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Per-client rate limiting configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Global throttle configuration; `null` disables the throttle
    #[serde(default = "default_throttle")]
    pub throttle: Option<ThrottleConfig>,
}

impl Default for PagegateConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limiter: LimiterConfig::default(),
            throttle: default_throttle(),
        }
    }
}

fn default_throttle() -> Option<ThrottleConfig> {
    Some(ThrottleConfig::default())
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_addr")]
    pub addr: SocketAddr,

    /// Take the client address from X-Forwarded-For / X-Real-IP when present
    #[serde(default = "default_trust_forwarded_headers")]
    pub trust_forwarded_headers: bool,

    /// Directory holding `index.html`
    #[serde(default)]
    pub template_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            trust_forwarded_headers: default_trust_forwarded_headers(),
            template_dir: None,
        }
    }
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_trust_forwarded_headers() -> bool {
    true
}

/// Per-client token bucket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Sustained requests per second per client
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// Maximum burst per client
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Seconds between sweeper passes
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Seconds of inactivity after which a client's state is dropped
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            refill_rate: default_refill_rate(),
            burst: default_burst(),
            sweep_interval_secs: default_sweep_interval(),
            idle_threshold_secs: default_idle_threshold(),
        }
    }
}

impl LimiterConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }
}

fn default_refill_rate() -> f64 {
    10.0
}

fn default_burst() -> u32 {
    50
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_threshold() -> u64 {
    180
}

/// Global backlog throttle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Maximum concurrently processed requests
    #[serde(default = "default_throttle_rate")]
    pub rate: usize,

    /// Maximum requests waiting for a slot
    #[serde(default = "default_backlog_limit")]
    pub backlog_limit: usize,

    /// Seconds a request may wait in the backlog
    #[serde(default = "default_backlog_timeout")]
    pub backlog_timeout_secs: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            rate: default_throttle_rate(),
            backlog_limit: default_backlog_limit(),
            backlog_timeout_secs: default_backlog_timeout(),
        }
    }
}

impl ThrottleConfig {
    pub fn backlog_timeout(&self) -> Duration {
        Duration::from_secs(self.backlog_timeout_secs)
    }
}

fn default_throttle_rate() -> usize {
    1000
}

fn default_backlog_limit() -> usize {
    1000
}

fn default_backlog_timeout() -> u64 {
    30
}

impl PagegateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PagegateError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Reject settings the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        let limiter = &self.limiter;
        if limiter.burst == 0 {
            return Err(PagegateError::Config("burst must be at least 1".into()));
        }
        if !limiter.refill_rate.is_finite() || limiter.refill_rate < 0.0 {
            return Err(PagegateError::Config(format!(
                "refill_rate must be a non-negative number, got {}",
                limiter.refill_rate
            )));
        }
        if limiter.sweep_interval_secs == 0 {
            return Err(PagegateError::Config(
                "sweep_interval_secs must be greater than zero".into(),
            ));
        }
        if let Some(throttle) = &self.throttle {
            if throttle.rate == 0 {
                return Err(PagegateError::Config(
                    "throttle rate must be greater than zero".into(),
                ));
            }
            GlobalThrottle::check_limits(throttle.rate, throttle.backlog_limit)
                .map_err(PagegateError::Config)?;
        }
        Ok(())
    }
}
