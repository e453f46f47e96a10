// src/core/store/mod.rs

//! The content-addressed backing stores that hold replicated objects.
//!
//! A `BackingStore` maps an `ObjectKey` to a payload plus its content hash and
//! access metadata. Local stores keep one blob per distinct content hash and
//! reference-count it, so identical payloads across objects are stored once.

pub mod config;
pub mod file;
pub mod key;
pub mod memory;
pub mod registry;
pub mod remote;

pub use config::StoreConfig;
pub use file::FileStore;
pub use key::ObjectKey;
pub use memory::MemoryStore;
pub use registry::StoreRegistry;
pub use remote::RemoteStore;

use crate::core::TriadError;
use crate::core::hash::ContentHash;
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

/// An object as held by a backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Bytes,
    pub content_hash: ContentHash,
    pub accessed_at: u64,
    pub expire_interval_ms: u64,
}

/// The storage interface used by the replication manager.
///
/// Implementations handle their own internal concurrency.
#[async_trait]
pub trait BackingStore: Send + Sync + Debug {
    /// The store's identifier, used in log lines.
    fn id(&self) -> &str;

    /// Returns the object, or `None` when the store holds no current value.
    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, TriadError>;

    /// Writes the payload under `key`. The access time is set to the write time.
    async fn put(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_hash: ContentHash,
        expire_interval_ms: u64,
    ) -> Result<(), TriadError>;

    /// Records an access at `now`. A missing key is not an error.
    async fn touch(&self, key: &ObjectKey, now: u64) -> Result<(), TriadError>;

    async fn remove(&self, key: &ObjectKey) -> Result<(), TriadError>;

    /// Deletes every expired object and returns how many were removed.
    async fn sweep_expired(&self, _now: u64) -> Result<usize, TriadError> {
        Ok(0)
    }

    async fn object_count(&self) -> Result<usize, TriadError> {
        Err(TriadError::Internal(format!(
            "store '{}' does not track an object count",
            self.id()
        )))
    }
}

/// An object expires once it has been idle for 5/4 of its expire interval.
pub fn is_expired(accessed_at: u64, expire_interval_ms: u64, now: u64) -> bool {
    accessed_at.saturating_add(expire_interval_ms.saturating_mul(5) / 4) < now
}
