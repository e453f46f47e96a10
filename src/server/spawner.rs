// src/server/spawner.rs

//! Spawns all of the node's long-running background tasks.

use super::context::ServerContext;
use crate::core::tasks::{ExpirySweeperTask, PoolHealthTask};

/// Spawns the background tasks into the context's JoinSet.
pub fn spawn_all(ctx: &mut ServerContext) {
    let replication = &ctx.config.replication;

    let health = PoolHealthTask::new(ctx.cluster.clone(), replication.health_check_interval);
    let shutdown_rx_health = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        health.run(shutdown_rx_health).await;
        Ok(())
    });

    let sweeper = ExpirySweeperTask::new(ctx.manager.clone(), replication.idle_check_interval);
    let shutdown_rx_sweep = ctx.shutdown_tx.subscribe();
    ctx.background_tasks.spawn(async move {
        sweeper.run(shutdown_rx_sweep).await;
        Ok(())
    });
}
