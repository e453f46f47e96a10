// src/core/cluster/server.rs

//! Defines `ClusterServer`, one member of the cluster together with its pool.

use crate::core::TriadError;
use crate::core::pool::{AcquireMode, ConnectionPool};
use crate::core::transport::{RequestBody, ResponseBody};
use crate::core::triad::TriadMember;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// A server in the cluster as seen from this node.
pub struct ClusterServer {
    index: usize,
    id: String,
    address: String,
    is_self: bool,
    pool: Arc<ConnectionPool>,
}

impl ClusterServer {
    pub fn new(index: usize, is_self: bool, pool: Arc<ConnectionPool>) -> Self {
        Self {
            index,
            id: pool.target_id().to_string(),
            address: pool.address().to_string(),
            is_self,
            pool,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// True for the server this process runs as.
    pub fn is_self(&self) -> bool {
        self.is_self
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Sends one request to this server and returns its reply.
    ///
    /// A `None` from the pool surfaces as `Unreachable`. The connection goes back to
    /// the idle ring after a reply; on error the guard has already disposed of it.
    pub async fn call(
        &self,
        mode: AcquireMode,
        body: RequestBody,
    ) -> Result<ResponseBody, TriadError> {
        let Some(mut conn) = self.pool.acquire(mode).await else {
            return Err(TriadError::Unreachable(self.id.clone()));
        };
        let reply = conn.call(body).await?;
        conn.release();
        Ok(reply)
    }

    /// Delivers an opaque message to this server's message listener.
    pub async fn message(&self, payload: Vec<u8>) -> Result<(), TriadError> {
        match self
            .call(AcquireMode::LiveOnly, RequestBody::Message { payload })
            .await?
        {
            ResponseBody::Ok => Ok(()),
            ResponseBody::Error(e) => Err(TriadError::Remote(e)),
            other => Err(TriadError::Protocol(format!(
                "unexpected reply to message from {}: {other:?}",
                self.id
            ))),
        }
    }

    /// Probes the server with a ping, waking its pool first.
    pub async fn ping(&self) -> bool {
        let ok = self.pool.can_connect().await;
        debug!("ping {} -> {}", self.id, ok);
        ok
    }
}

impl TriadMember for ClusterServer {
    fn member_index(&self) -> usize {
        self.index
    }

    /// The local server is always live to itself.
    fn is_active(&self) -> bool {
        self.is_self || self.pool.is_active()
    }
}

impl fmt::Debug for ClusterServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterServer")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("address", &self.address)
            .field("is_self", &self.is_self)
            .finish()
    }
}
