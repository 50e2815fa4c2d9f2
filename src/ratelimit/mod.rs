//! Per-client rate state: token buckets, the visitor registry and its sweeper.

mod bucket;
mod registry;
mod sweeper;

pub use bucket::TokenBucket;
pub use registry::VisitorRegistry;
pub use sweeper::{Sweeper, SweeperHandle};
