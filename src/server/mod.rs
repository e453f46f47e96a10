// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, reload};

mod connection_loop;
mod context;
mod initialization;
mod spawner;

pub use connection_loop::serve;

/// The main node startup function, orchestrating all setup phases.
pub async fn run(
    config: Config,
    config_path: Option<String>,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    // 1. Build the cluster view, stores, replication manager and listener.
    let mut server_context =
        initialization::setup(config, config_path, log_reload_handle).await?;

    // 2. Spawn all background tasks.
    spawner::spawn_all(&mut server_context);

    // 3. Serve siblings until shutdown.
    connection_loop::run(server_context).await
}
