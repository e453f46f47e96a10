// src/core/store/memory.rs

//! An in-process backing store with reference-counted content blobs.

use super::{BackingStore, ObjectKey, StoredObject, is_expired};
use crate::core::TriadError;
use crate::core::clock::now_millis;
use crate::core::hash::ContentHash;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Clone)]
struct IndexEntry {
    content_hash: ContentHash,
    accessed_at: u64,
    expire_interval_ms: u64,
}

#[derive(Debug)]
struct Blob {
    data: Bytes,
    refs: usize,
}

#[derive(Debug, Default)]
struct Tables {
    index: HashMap<ObjectKey, IndexEntry>,
    blobs: HashMap<ContentHash, Blob>,
}

impl Tables {
    fn release_blob(&mut self, hash: &ContentHash) {
        if let Some(blob) = self.blobs.get_mut(hash) {
            blob.refs -= 1;
            if blob.refs == 0 {
                self.blobs.remove(hash);
            }
        }
    }
}

/// Keeps every object in memory. Content is deduplicated by hash.
#[derive(Debug)]
pub struct MemoryStore {
    id: String,
    tables: Mutex<Tables>,
    puts: AtomicU64,
    touches: AtomicU64,
}

impl MemoryStore {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tables: Mutex::new(Tables::default()),
            puts: AtomicU64::new(0),
            touches: AtomicU64::new(0),
        }
    }

    /// Number of distinct content blobs held.
    pub fn blob_count(&self) -> usize {
        self.tables.lock().blobs.len()
    }

    /// Number of `put` calls served.
    pub fn put_count(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    /// Number of `touch` calls served.
    pub fn touch_count(&self) -> u64 {
        self.touches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, TriadError> {
        let tables = self.tables.lock();
        let Some(entry) = tables.index.get(key) else {
            return Ok(None);
        };
        let blob = tables.blobs.get(&entry.content_hash).ok_or_else(|| {
            TriadError::Internal(format!("blob {} missing for {}", entry.content_hash, key))
        })?;
        Ok(Some(StoredObject {
            data: blob.data.clone(),
            content_hash: entry.content_hash,
            accessed_at: entry.accessed_at,
            expire_interval_ms: entry.expire_interval_ms,
        }))
    }

    async fn put(
        &self,
        key: &ObjectKey,
        data: Bytes,
        content_hash: ContentHash,
        expire_interval_ms: u64,
    ) -> Result<(), TriadError> {
        self.puts.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.lock();

        tables
            .blobs
            .entry(content_hash)
            .or_insert_with(|| Blob { data, refs: 0 })
            .refs += 1;

        let previous = tables.index.insert(
            key.clone(),
            IndexEntry {
                content_hash,
                accessed_at: now_millis(),
                expire_interval_ms,
            },
        );
        if let Some(previous) = previous {
            tables.release_blob(&previous.content_hash);
        }
        Ok(())
    }

    async fn touch(&self, key: &ObjectKey, now: u64) -> Result<(), TriadError> {
        self.touches.fetch_add(1, Ordering::Relaxed);
        if let Some(entry) = self.tables.lock().index.get_mut(key) {
            entry.accessed_at = entry.accessed_at.max(now);
        }
        Ok(())
    }

    async fn remove(&self, key: &ObjectKey) -> Result<(), TriadError> {
        let mut tables = self.tables.lock();
        if let Some(entry) = tables.index.remove(key) {
            tables.release_blob(&entry.content_hash);
        }
        Ok(())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, TriadError> {
        let mut tables = self.tables.lock();
        let expired: Vec<ObjectKey> = tables
            .index
            .iter()
            .filter(|(_, e)| is_expired(e.accessed_at, e.expire_interval_ms, now))
            .map(|(k, _)| k.clone())
            .collect();

        for key in &expired {
            if let Some(entry) = tables.index.remove(key) {
                tables.release_blob(&entry.content_hash);
            }
        }
        if !expired.is_empty() {
            debug!("Store '{}' expired {} object(s)", self.id, expired.len());
        }
        Ok(expired.len())
    }

    async fn object_count(&self) -> Result<usize, TriadError> {
        Ok(self.tables.lock().index.len())
    }
}
