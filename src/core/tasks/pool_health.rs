// src/core/tasks/pool_health.rs

//! A background task that keeps the pools of sibling servers healthy.
//!
//! On every tick it re-evaluates each pool's warmup progress, probes targets that
//! are in FAIL once their recover window has elapsed, and logs a status line for
//! every pool that is not ACTIVE.

use crate::core::clock::now_millis;
use crate::core::cluster::{ClusterContext, ClusterServer};
use crate::core::pool::PoolState;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct PoolHealthTask {
    cluster: Arc<ClusterContext>,
    interval: Duration,
}

impl PoolHealthTask {
    pub fn new(cluster: Arc<ClusterContext>, interval: Duration) -> Self {
        Self { cluster, interval }
    }

    /// The main run loop for the health task.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "Pool health task started for {} server(s), interval {:?}",
            self.cluster.servers().len(),
            self.interval
        );
        let mut interval = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Pool health task shutting down.");
                    return;
                }
            }
        }
    }

    /// Runs a single health cycle. Returns how many probes succeeded.
    pub async fn run_once(&self) -> usize {
        let now = now_millis();
        let mut to_probe: Vec<&Arc<ClusterServer>> = Vec::new();

        for server in self.cluster.servers().iter().filter(|s| !s.is_self()) {
            let pool = server.pool();
            let state = pool.state();
            if state == PoolState::Fail && !pool.is_failed(now) {
                to_probe.push(server);
            }
            if state != PoolState::Active {
                match serde_json::to_string(&pool.snapshot()) {
                    Ok(status) => debug!("Pool status {}", status),
                    Err(e) => debug!("Could not render status of {}: {}", pool, e),
                }
            }
        }

        if to_probe.is_empty() {
            return 0;
        }

        let results = join_all(to_probe.iter().map(|server| server.ping())).await;
        let recovered = results.iter().filter(|ok| **ok).count();
        for (server, ok) in to_probe.iter().zip(&results) {
            if *ok {
                info!("Server '{}' answered a probe and is recovering", server.id());
            } else {
                debug!("Server '{}' is still unreachable", server.id());
            }
        }
        recovered
    }
}
