// src/connection/service.rs

//! Defines `RequestService`, which answers sibling RPC requests from local stores.

use crate::core::TriadError;
use crate::core::hash::ContentHash;
use crate::core::pool::PoolState;
use crate::core::replication::ReplicationManager;
use crate::core::store::{BackingStore, ObjectKey};
use crate::core::transport::{RequestBody, ResponseBody, RpcRequest, RpcResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info};

/// Receives opaque messages sent by siblings.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, source: &str, payload: Vec<u8>) -> Result<(), TriadError>;
}

/// Serves sibling requests for the stores this node holds.
///
/// At most `max_inflight` requests are served at once; further requests are
/// answered with `Busy` so the caller's pool backs off.
pub struct RequestService {
    node_id: String,
    manager: Arc<ReplicationManager>,
    inflight: Semaphore,
    listener: Option<Arc<dyn MessageListener>>,
}

impl RequestService {
    pub fn new(node_id: impl Into<String>, manager: Arc<ReplicationManager>, max_inflight: usize) -> Self {
        Self {
            node_id: node_id.into(),
            manager,
            inflight: Semaphore::new(max_inflight),
            listener: None,
        }
    }

    /// Installs the listener that receives `Message` requests.
    pub fn with_listener(mut self, listener: Arc<dyn MessageListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Answers one request. Never fails: errors become `ResponseBody::Error`.
    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let Ok(_permit) = self.inflight.try_acquire() else {
            debug!(
                "Rejecting {} from '{}': too many requests in flight",
                request.body.kind(),
                request.source
            );
            return RpcResponse::new(request.id, ResponseBody::Busy);
        };

        if request.target != self.node_id {
            return RpcResponse::new(
                request.id,
                ResponseBody::Error(format!(
                    "request for '{}' reached '{}'",
                    request.target, self.node_id
                )),
            );
        }

        self.note_peer_alive(&request.source);

        let body = match self.dispatch(&request.source, request.body).await {
            Ok(body) => body,
            Err(e) => ResponseBody::Error(e.to_string()),
        };
        RpcResponse::new(request.id, body)
    }

    /// A request from a sibling proves it is reachable; wake its pool if it was failed.
    fn note_peer_alive(&self, source: &str) {
        if let Some(server) = self.manager.cluster().server_by_id(source)
            && !server.is_self()
            && server.pool().state() == PoolState::Fail
        {
            info!("Heard from failed server '{}', waking its pool", source);
            server.pool().wake();
        }
    }

    fn store(&self, key: &ObjectKey) -> Result<&Arc<dyn BackingStore>, TriadError> {
        self.manager
            .local_store(&key.store_id)
            .ok_or_else(|| TriadError::StoreNotConfigured(key.store_id.clone()))
    }

    async fn dispatch(&self, source: &str, body: RequestBody) -> Result<ResponseBody, TriadError> {
        match body {
            RequestBody::Ping => Ok(ResponseBody::Pong),
            RequestBody::Load { key } => match self.store(&key)?.get(&key).await? {
                Some(object) => Ok(ResponseBody::Loaded {
                    data: object.data.to_vec(),
                    content_hash: object.content_hash,
                    accessed_at: object.accessed_at,
                    expire_interval_ms: object.expire_interval_ms,
                }),
                None => Ok(ResponseBody::NotFound),
            },
            RequestBody::Store {
                key,
                data,
                content_hash,
                expire_interval_ms,
            } => {
                if ContentHash::of(&data) != content_hash {
                    return Err(TriadError::Protocol(format!(
                        "content hash mismatch for {key}"
                    )));
                }
                self.store(&key)?
                    .put(&key, Bytes::from(data), content_hash, expire_interval_ms)
                    .await?;
                Ok(ResponseBody::Ok)
            }
            RequestBody::Touch { key, now } => {
                self.store(&key)?.touch(&key, now).await?;
                Ok(ResponseBody::Ok)
            }
            RequestBody::Remove { key } => {
                self.store(&key)?.remove(&key).await?;
                Ok(ResponseBody::Ok)
            }
            RequestBody::Message { payload } => match &self.listener {
                Some(listener) => {
                    listener.on_message(source, payload).await?;
                    Ok(ResponseBody::Ok)
                }
                None => Err(TriadError::Internal(format!(
                    "'{}' has no message listener",
                    self.node_id
                ))),
            },
        }
    }
}
