//! Background eviction of idle visitors.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::registry::VisitorRegistry;

/// Periodically removes visitors that have been idle longer than a threshold.
///
/// An evicted client that returns gets a fresh, full bucket.
#[derive(Debug)]
pub struct Sweeper {
    registry: Arc<VisitorRegistry>,
    /// Sleep between passes
    sweep_interval: Duration,
    /// Idle time after which a visitor is evicted
    idle_threshold: Duration,
}

/// Handle to a running sweeper task.
///
/// Dropping the handle without calling [`shutdown`](Self::shutdown) also stops
/// the loop, but does not wait for it.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal the sweeper to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

impl Sweeper {
    /// Create a sweeper for `registry`.
    pub fn new(
        registry: Arc<VisitorRegistry>,
        sweep_interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            registry,
            sweep_interval,
            idle_threshold,
        }
    }

    /// Start the sweep loop on the current tokio runtime.
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        SweeperHandle { shutdown_tx, task }
    }

    /// Sleep, sweep, repeat until `shutdown` flips to `true` or its sender
    /// is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sweep_interval = ?self.sweep_interval,
            idle_threshold = ?self.idle_threshold,
            "Visitor sweeper started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.sweep_interval) => {
                    let evicted = self.registry.sweep(self.idle_threshold);
                    debug!(evicted, "Sweep pass complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Visitor sweeper stopped");
    }
}
