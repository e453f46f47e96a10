// src/core/pool/guard.rs

//! Defines `PooledConnection`, the RAII handle for a checked-out connection.

use super::ConnectionPool;
use super::slot::ConnectionSlot;
use crate::core::TriadError;
use crate::core::transport::{RequestBody, ResponseBody, RpcRequest};
use std::sync::Arc;
use tracing::debug;

/// A connection borrowed from a `ConnectionPool`.
///
/// Call `release` after a successful exchange to return the connection to the
/// idle ring. Dropping the handle without releasing it closes the connection,
/// so an abandoned request never leaks an active count.
#[derive(Debug)]
pub struct PooledConnection {
    pool: Arc<ConnectionPool>,
    slot: Option<ConnectionSlot>,
}

impl PooledConnection {
    pub(crate) fn new(pool: Arc<ConnectionPool>, slot: ConnectionSlot) -> Self {
        Self {
            pool,
            slot: Some(slot),
        }
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// The id of the underlying slot, or 0 once the connection is gone.
    pub fn slot_id(&self) -> u64 {
        self.slot.as_ref().map(|s| s.id).unwrap_or(0)
    }

    /// Sends one request and waits for the reply within the socket timeout.
    ///
    /// A timeout or I/O failure marks the pool failed and destroys this connection.
    /// A `Busy` reply marks the pool busy and surfaces as `RemoteBusy`; the
    /// connection itself stays usable.
    pub async fn call(&mut self, body: RequestBody) -> Result<ResponseBody, TriadError> {
        let target = self.pool.target_id().to_string();
        let Some(slot) = self.slot.as_mut() else {
            return Err(TriadError::Closed(target));
        };

        let request = RpcRequest {
            id: self.pool.next_request_id(),
            source: self.pool.source_id().to_string(),
            target: target.clone(),
            body,
        };
        let kind = request.body.kind();
        slot.lifetime_uses += 1;

        let timeout = self.pool.config().socket_timeout;
        match tokio::time::timeout(timeout, slot.connection.call(request)).await {
            Ok(Ok(response)) => match response.body {
                ResponseBody::Busy => {
                    self.pool.busy();
                    Err(TriadError::RemoteBusy(target))
                }
                body => Ok(body),
            },
            Ok(Err(e)) => {
                debug!("{} {} failed: {}", self.pool.debug_id(), kind, e);
                self.discard_failed();
                Err(e)
            }
            Err(_) => {
                debug!(
                    "{} {} timed out after {:?}",
                    self.pool.debug_id(),
                    kind,
                    timeout
                );
                self.discard_failed();
                Err(TriadError::Timeout(target))
            }
        }
    }

    /// Returns the connection to the pool's idle ring.
    pub fn release(mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.free(slot);
        }
    }

    fn discard_failed(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.fail_socket();
            self.pool.close_slot(slot);
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.close_slot(slot);
        }
    }
}
