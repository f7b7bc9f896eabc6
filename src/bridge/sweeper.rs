// src/bridge/sweeper.rs

use crate::bridge::registry::ConnectionRegistry;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// A task that periodically removes registry entries whose transport already
/// closed without the event-driven path catching it.
pub struct SweeperTask {
    registry: ConnectionRegistry,
    interval: Duration,
}

impl SweeperTask {
    /// Creates a new `SweeperTask` ticking every `interval`.
    pub fn new(registry: ConnectionRegistry, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Runs the main loop for the sweeper task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Connection sweeper started. Sweep interval: {:?}",
            self.interval
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.registry.sweep();
                    if removed > 0 {
                        debug!("Connection sweeper: removed {} dead registry entries.", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Connection sweeper shutting down.");
                    return;
                }
            }
        }
    }
}
