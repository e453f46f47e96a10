// src/core/tasks/expiry_sweeper.rs

//! A background task that periodically expires idle objects.

use crate::core::clock::now_millis;
use crate::core::replication::ReplicationManager;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Calls `ReplicationManager::sweep_expired` on a fixed interval.
pub struct ExpirySweeperTask {
    manager: Arc<ReplicationManager>,
    interval: Duration,
}

impl ExpirySweeperTask {
    pub fn new(manager: Arc<ReplicationManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Expiry sweeper task started, interval {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        // The first tick completes immediately; there is nothing to sweep at startup.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let deleted = self.manager.sweep_expired(now_millis()).await;
                    debug!("Expiry sweep cycle deleted {} object(s)", deleted);
                }
                _ = shutdown_rx.recv() => {
                    info!("Expiry sweeper task shutting down.");
                    return;
                }
            }
        }
    }
}
