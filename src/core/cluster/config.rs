// src/core/cluster/config.rs

//! Defines the static cluster topology configuration.

use crate::core::pool::PoolConfig;
use serde::{Deserialize, Serialize};

/// The fixed list of servers in the cluster, in index order.
///
/// Consecutive runs of three servers form one triad; a trailing run of one or two
/// servers forms a smaller group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default)]
    pub servers: Vec<ClusterServerConfig>,
}

/// One server of the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterServerConfig {
    pub id: String,
    /// The `host:port` of the server's RPC listener.
    pub address: String,
    /// Per-target pool settings. Replaces the top-level `[pool]` table for this
    /// server when present.
    #[serde(default)]
    pub pool: Option<PoolConfig>,
}
