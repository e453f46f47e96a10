// src/core/cluster/mod.rs

//! The static cluster: every configured server, its pool, and the triads the
//! servers are grouped into.

pub mod config;
pub mod server;

pub use config::{ClusterConfig, ClusterServerConfig};
pub use server::ClusterServer;

use crate::core::TriadError;
use crate::core::pool::{ConnectionPool, PoolConfig};
use crate::core::transport::Connector;
use crate::core::triad::{OwnerTag, ServerGroup};
use std::sync::Arc;
use tracing::info;

/// Members per triad.
pub const TRIAD_SIZE: usize = 3;

/// The cluster view of one node, passed explicitly to every component that needs it.
#[derive(Debug)]
pub struct ClusterContext {
    self_index: usize,
    servers: Vec<Arc<ClusterServer>>,
    groups: Vec<ServerGroup<Arc<ClusterServer>>>,
}

impl ClusterContext {
    /// Builds the cluster view for `self_id`, creating and starting a pool per server.
    pub fn new(
        self_id: &str,
        config: &ClusterConfig,
        default_pool: &PoolConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, TriadError> {
        let self_index = config
            .servers
            .iter()
            .position(|s| s.id == self_id)
            .ok_or_else(|| {
                TriadError::Internal(format!("node id '{self_id}' is not a cluster server"))
            })?;

        let servers: Vec<Arc<ClusterServer>> = config
            .servers
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let pool_config = entry.pool.clone().unwrap_or_else(|| default_pool.clone());
                let pool = Arc::new(ConnectionPool::new(
                    self_id,
                    entry.id.clone(),
                    entry.address.clone(),
                    pool_config,
                    connector.clone(),
                ));
                pool.init();
                Arc::new(ClusterServer::new(index, index == self_index, pool))
            })
            .collect();

        let groups = servers
            .chunks(TRIAD_SIZE)
            .map(|chunk| ServerGroup::from_members(chunk.to_vec()))
            .collect::<Vec<_>>();

        info!(
            "Cluster context for '{}': {} server(s) in {} group(s)",
            self_id,
            servers.len(),
            groups.len()
        );

        Ok(Self {
            self_index,
            servers,
            groups,
        })
    }

    pub fn self_server(&self) -> &Arc<ClusterServer> {
        &self.servers[self.self_index]
    }

    pub fn self_index(&self) -> usize {
        self.self_index
    }

    pub fn servers(&self) -> &[Arc<ClusterServer>] {
        &self.servers
    }

    pub fn server(&self, index: usize) -> Option<&Arc<ClusterServer>> {
        self.servers.get(index)
    }

    pub fn server_by_id(&self, id: &str) -> Option<&Arc<ClusterServer>> {
        self.servers.iter().find(|s| s.id() == id)
    }

    pub fn groups(&self) -> &[ServerGroup<Arc<ClusterServer>>] {
        &self.groups
    }

    /// The triad that owns objects with `key_hash`.
    pub fn group_for(&self, key_hash: u64) -> &ServerGroup<Arc<ClusterServer>> {
        let index = ((key_hash >> 16) % self.groups.len() as u64) as usize;
        &self.groups[index]
    }

    pub fn owner_tag(&self, key_hash: u64) -> OwnerTag {
        OwnerTag::from_hash(key_hash)
    }

    /// Closes every pool.
    pub fn close(&self) {
        for server in &self.servers {
            server.pool().close();
        }
    }
}
