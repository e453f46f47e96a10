// src/server/context.rs

use crate::config::Config;
use crate::connection::RequestService;
use crate::core::cluster::ClusterContext;
use crate::core::replication::ReplicationManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing_subscriber::{filter::EnvFilter, reload};

/// Holds all the initialized state required to run the node's main loop.
pub struct ServerContext {
    pub config: Config,
    pub config_path: Option<String>,
    pub cluster: Arc<ClusterContext>,
    pub manager: Arc<ReplicationManager>,
    pub service: Arc<RequestService>,
    pub listener: TcpListener,
    pub shutdown_tx: broadcast::Sender<()>,
    pub background_tasks: JoinSet<Result<(), anyhow::Error>>,
    pub log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
}
