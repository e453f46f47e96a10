// src/config.rs

//! Manages node configuration: loading, defaults, and validation.

use crate::core::cluster::ClusterConfig;
use crate::core::pool::PoolConfig;
use crate::core::replication::ReplicationConfig;
use crate::core::store::StoreConfig;
use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use tracing::warn;

/// Identifies this node within the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Must match the `id` of one `[[cluster.servers]]` entry.
    pub id: String,
}

/// Settings of the sibling RPC listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind. Empty means the address of this node's cluster entry.
    #[serde(default)]
    pub listen: String,
    /// Requests served concurrently before answering `Busy`.
    #[serde(default = "default_max_inflight")]
    pub max_inflight: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: String::new(),
            max_inflight: default_max_inflight(),
        }
    }
}

fn default_max_inflight() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The complete node configuration, as read from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub node: NodeConfig,
    /// Default pool settings for every target without its own `pool` table.
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub replication: ReplicationConfig,
    #[serde(default)]
    pub stores: Vec<StoreConfig>,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Config {
    /// Loads and validates the configuration at `path`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml(&contents).with_context(|| format!("Invalid configuration in '{path}'"))
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("Failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// The address the RPC listener binds to.
    pub fn listen_address(&self) -> Result<String> {
        if !self.server.listen.is_empty() {
            return Ok(self.server.listen.clone());
        }
        self.cluster
            .servers
            .iter()
            .find(|s| s.id == self.node.id)
            .map(|s| s.address.clone())
            .ok_or_else(|| anyhow!("node id '{}' is not a cluster server", self.node.id))
    }

    /// Validates the configuration for logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.node.id.trim().is_empty() {
            return Err(anyhow!("node.id cannot be empty"));
        }
        if self.cluster.servers.is_empty() {
            return Err(anyhow!("cluster.servers must list at least this node"));
        }

        let mut ids = HashSet::new();
        for server in &self.cluster.servers {
            if server.id.trim().is_empty() {
                return Err(anyhow!("cluster server ids cannot be empty"));
            }
            if server.address.trim().is_empty() {
                return Err(anyhow!("cluster server '{}' has no address", server.id));
            }
            if !ids.insert(server.id.as_str()) {
                return Err(anyhow!("duplicate cluster server id '{}'", server.id));
            }
            if let Some(pool) = &server.pool {
                validate_pool(pool).with_context(|| format!("pool of server '{}'", server.id))?;
            }
        }
        if !ids.contains(self.node.id.as_str()) {
            return Err(anyhow!(
                "node.id '{}' does not match any cluster server",
                self.node.id
            ));
        }

        validate_pool(&self.pool).context("[pool]")?;

        if self.replication.idle_check_interval.is_zero() {
            return Err(anyhow!("replication.idle_check_interval cannot be 0"));
        }
        if self.replication.health_check_interval.is_zero() {
            return Err(anyhow!("replication.health_check_interval cannot be 0"));
        }

        let mut store_ids = HashSet::new();
        for store in &self.stores {
            if !store_ids.insert(store.id.as_str()) {
                return Err(anyhow!("duplicate store id '{}'", store.id));
            }
            if store.kind == "file" && store.path.is_none() {
                return Err(anyhow!("file store '{}' needs a path", store.id));
            }
            if store.max_idle_time.is_zero() {
                return Err(anyhow!("store '{}' max_idle_time cannot be 0", store.id));
            }
        }

        if self.server.max_inflight == 0 {
            return Err(anyhow!("server.max_inflight cannot be 0"));
        }

        Ok(())
    }
}

fn validate_pool(pool: &PoolConfig) -> Result<()> {
    if pool.connect_timeout.is_zero() {
        return Err(anyhow!("connect_timeout cannot be 0"));
    }
    if pool.socket_timeout.is_zero() {
        return Err(anyhow!("socket_timeout cannot be 0"));
    }
    if pool.max_connections == 0 {
        return Err(anyhow!("max_connections cannot be 0"));
    }
    if pool.idle_pool_size > pool.max_connections {
        warn!(
            "idle_pool_size ({}) exceeds max_connections ({}); the idle ring will never fill",
            pool.idle_pool_size, pool.max_connections
        );
    }
    Ok(())
}
