// src/core/replication/record.rs

//! Defines `ObjectRecord`, the local metadata kept for one replicated object.

use crate::core::hash::ContentHash;
use crate::core::store::ObjectKey;
use crate::core::triad::OwnerTag;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Access propagation never happens more often than this.
pub const MIN_ACCESS_WINDOW_MS: u64 = 60_000;

/// How long an access may go unrecorded in the backing store.
pub fn access_window_ms(expire_interval_ms: u64) -> u64 {
    MIN_ACCESS_WINDOW_MS.max(expire_interval_ms / 4)
}

/// The mutable part of a record, guarded by the record lock.
///
/// The lock is held across a backing store fetch, so at most one fetch per key
/// is ever in flight.
#[derive(Debug, Default)]
pub struct RecordState {
    /// The last payload loaded or written through this node.
    pub payload: Option<Bytes>,
    /// Hash of the last payload accepted by the authoritative owner.
    pub content_hash: Option<ContentHash>,
    pub valid: bool,
    /// An in-memory update has not been written yet.
    pub changed: bool,
    /// When the cached payload was read from its owner.
    pub loaded_at: u64,
    pub accessed_at: u64,
    pub last_persisted_access: u64,
    pub expire_interval_ms: u64,
    /// Serialization failed once; the object is never written again.
    pub inert: bool,
    /// The object was removed while this record was live. Callers that waited
    /// on its lock must look the key up again.
    pub removed: bool,
}

impl RecordState {
    /// Whether an access at `now` should be propagated to the owners.
    pub fn access_is_due(&self, now: u64) -> bool {
        now.saturating_sub(self.last_persisted_access) >= access_window_ms(self.expire_interval_ms)
    }

    /// Whether the record has been idle past its expire interval.
    pub fn is_idle(&self, now: u64) -> bool {
        self.accessed_at.saturating_add(self.expire_interval_ms) < now
    }
}

/// One replicated object as tracked by this node.
#[derive(Debug)]
pub struct ObjectRecord {
    key: ObjectKey,
    key_hash: u64,
    owner_tag: OwnerTag,
    is_primary_here: bool,
    pub(crate) state: Arc<Mutex<RecordState>>,
}

impl ObjectRecord {
    pub fn new(
        key: ObjectKey,
        key_hash: u64,
        is_primary_here: bool,
        expire_interval_ms: u64,
        now: u64,
    ) -> Self {
        Self {
            key,
            key_hash,
            owner_tag: OwnerTag::from_hash(key_hash),
            is_primary_here,
            state: Arc::new(Mutex::new(RecordState {
                accessed_at: now,
                expire_interval_ms,
                ..RecordState::default()
            })),
        }
    }

    pub fn key(&self) -> &ObjectKey {
        &self.key
    }

    pub fn key_hash(&self) -> u64 {
        self.key_hash
    }

    pub fn owner_tag(&self) -> OwnerTag {
        self.owner_tag
    }

    /// True when this node is the object's primary owner.
    pub fn is_primary_here(&self) -> bool {
        self.is_primary_here
    }

    /// A cached payload may be served without asking the owner if it is valid and
    /// either owned here or younger than `remote_cache_ttl_ms`.
    pub fn is_servable(&self, state: &RecordState, now: u64, remote_cache_ttl_ms: u64) -> bool {
        state.valid
            && state.payload.is_some()
            && (self.is_primary_here || now.saturating_sub(state.loaded_at) < remote_cache_ttl_ms)
    }
}
