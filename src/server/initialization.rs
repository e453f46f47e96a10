// src/server/initialization.rs

//! Builds every node component from the configuration: the cluster view and its
//! pools, the local stores, the replication manager and the RPC listener.

use super::context::ServerContext;
use crate::config::Config;
use crate::connection::RequestService;
use crate::core::cluster::ClusterContext;
use crate::core::replication::ReplicationManager;
use crate::core::store::StoreRegistry;
use crate::core::transport::TcpConnector;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

/// Initializes all node components before starting the main loop.
pub async fn setup(
    config: Config,
    config_path: Option<String>,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<ServerContext> {
    log_startup_info(&config);
    let (shutdown_tx, _) = broadcast::channel(1);

    let cluster = Arc::new(
        ClusterContext::new(
            &config.node.id,
            &config.cluster,
            &config.pool,
            Arc::new(TcpConnector),
        )
        .context("Failed to build the cluster context")?,
    );

    let mut manager = ReplicationManager::new(cluster.clone(), config.replication.clone());
    let registry = StoreRegistry::with_defaults();
    for store_config in &config.stores {
        let store = registry
            .open(store_config)
            .await
            .with_context(|| format!("Failed to open store '{}'", store_config.id))?;
        manager.register_store(store, store_config.max_idle_time.as_millis() as u64);
    }
    if config.stores.is_empty() {
        warn!("No stores configured. This node only forwards requests to its siblings.");
    }
    let manager = Arc::new(manager);

    let service = Arc::new(RequestService::new(
        config.node.id.clone(),
        manager.clone(),
        config.server.max_inflight,
    ));

    let listen = config.listen_address()?;
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind RPC listener on {listen}"))?;
    info!("Node '{}' listening on {}", config.node.id, listen);

    Ok(ServerContext {
        config,
        config_path,
        cluster,
        manager,
        service,
        listener,
        shutdown_tx,
        background_tasks: JoinSet::new(),
        log_reload_handle,
    })
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Starting node '{}' in a cluster of {} server(s).",
        config.node.id,
        config.cluster.servers.len()
    );
    info!(
        "Pool defaults: connect_timeout={:?} socket_timeout={:?} warmup_time={:?} fail_recover_time={:?}",
        config.pool.connect_timeout,
        config.pool.socket_timeout,
        config.pool.warmup_time,
        config.pool.fail_recover_time
    );
    for store in &config.stores {
        info!(
            "Store '{}' ({}) with max_idle_time={:?}",
            store.id, store.kind, store.max_idle_time
        );
    }
}
