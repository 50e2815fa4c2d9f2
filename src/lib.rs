//! Pagegate - per-client admission control for recognition and lyrics pages
//!
//! This crate puts a per-client token bucket, an idle-visitor sweeper and an
//! optional global backlog throttle in front of the page routes, so abusive or
//! bursty clients are turned away before any lookup work happens.

pub mod admission;
pub mod backend;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod ratelimit;
