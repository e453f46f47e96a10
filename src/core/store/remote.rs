// src/core/store/remote.rs

//! A backing store that forwards every call to a sibling server over RPC.

use super::{BackingStore, ObjectKey, StoredObject};
use crate::core::TriadError;
use crate::core::cluster::ClusterServer;
use crate::core::hash::ContentHash;
use crate::core::pool::AcquireMode;
use crate::core::transport::{RequestBody, ResponseBody};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Reads and writes objects held by a remote owner.
///
/// Requests use `LiveOnly` admission: replication traffic only honours the
/// fail-recover window, not the warmup throttle.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    server: Arc<ClusterServer>,
}

impl RemoteStore {
    pub fn new(server: Arc<ClusterServer>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &Arc<ClusterServer> {
        &self.server
    }

    async fn call(&self, body: RequestBody) -> Result<ResponseBody, TriadError> {
        match self.server.call(AcquireMode::LiveOnly, body).await? {
            ResponseBody::Error(e) => Err(TriadError::Remote(e)),
            reply => Ok(reply),
        }
    }

    async fn expect_ok(&self, body: RequestBody) -> Result<(), TriadError> {
        let kind = body.kind();
        match self.call(body).await? {
            ResponseBody::Ok => Ok(()),
            other => Err(self.unexpected(kind, &other)),
        }
    }

    fn unexpected(&self, kind: &str, reply: &ResponseBody) -> TriadError {
        TriadError::Protocol(format!(
            "unexpected reply to {} from {}: {:?}",
            kind,
            self.server.id(),
            reply
        ))
    }
}

#[async_trait]
impl BackingStore for RemoteStore {
    fn id(&self) -> &str {
        self.server.id()
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, TriadError> {
        match self.call(RequestBody::Load { key: key.clone() }).await? {
            ResponseBody::Loaded {
                data,
                content_hash,
                accessed_at,
                expire_interval_ms,
            } => Ok(Some(StoredObject {
                data: Bytes::from(data),
                content_hash,
                accessed_at,
                expire_interval_ms,
            })),
            ResponseBody::NotFound => Ok(None),
            other => Err(self.unexpected("load", &other)),
        }
    }

    async fn put(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_hash: ContentHash,
        expire_interval_ms: u64,
    ) -> Result<(), TriadError> {
        self.expect_ok(RequestBody::Store {
            key: key.clone(),
            data: data.to_vec(),
            content_hash,
            expire_interval_ms,
        })
        .await
    }

    async fn touch(&self, key: &ObjectKey, now: u64) -> Result<(), TriadError> {
        self.expect_ok(RequestBody::Touch {
            key: key.clone(),
            now,
        })
        .await
    }

    async fn remove(&self, key: &ObjectKey) -> Result<(), TriadError> {
        self.expect_ok(RequestBody::Remove { key: key.clone() })
            .await
    }
}
