// src/core/replication/manager.rs

//! Implements `ReplicationManager`, the distributed object cache.
//!
//! Each object is owned by a triad chosen from its key hash. The manager keeps a
//! local `ObjectRecord` per object it has seen, serves cached payloads while they
//! are fresh, reads through to the best live owner otherwise, and writes changed
//! payloads to every owner. Unchanged payloads are detected by content hash and
//! never written.
//!
//! Transport and store errors never reach callers. A failed load is reported as
//! `None` and a failed store as `StoreOutcome::Unavailable`; the next call retries.

use super::config::ReplicationConfig;
use super::record::{ObjectRecord, RecordState};
use crate::core::TriadError;
use crate::core::clock::now_millis;
use crate::core::cluster::{ClusterContext, ClusterServer};
use crate::core::hash::ContentHash;
use crate::core::store::{BackingStore, ObjectKey, RemoteStore, StoredObject};
use crate::core::transport::protocol::wire_config;
use crate::core::triad::TriadMember;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{MutexGuard, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// The result of a store request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StoreOutcome {
    /// The authoritative owner accepted the new payload.
    Written,
    /// The payload's content hash matched the last write; nothing was sent.
    Unchanged,
    /// No authoritative owner accepted the write. The next store retries.
    Unavailable,
    /// The value could not be serialized. The object is given up on.
    NonSerializable,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    writes: AtomicU64,
    skipped_writes: AtomicU64,
    touches: AtomicU64,
}

/// A point-in-time copy of the manager's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplicationStats {
    pub records: usize,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub writes: u64,
    pub skipped_writes: u64,
    pub touches: u64,
}

/// Caches and replicates objects across their triad of owners.
#[derive(Debug)]
pub struct ReplicationManager {
    cluster: Arc<ClusterContext>,
    config: ReplicationConfig,
    stores: HashMap<String, Arc<dyn BackingStore>>,
    expire_intervals: HashMap<String, u64>,
    records: DashMap<ObjectKey, Arc<ObjectRecord>>,
    counters: Counters,
}

impl ReplicationManager {
    pub fn new(cluster: Arc<ClusterContext>, config: ReplicationConfig) -> Self {
        Self {
            cluster,
            config,
            stores: HashMap::new(),
            expire_intervals: HashMap::new(),
            records: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Registers a local store. Objects of that store expire after `max_idle_ms`
    /// unless set otherwise.
    pub fn register_store(&mut self, store: Arc<dyn BackingStore>, max_idle_ms: u64) {
        let id = store.id().to_string();
        info!("Replication manager serves store '{}' locally", id);
        self.expire_intervals.insert(id.clone(), max_idle_ms);
        self.stores.insert(id, store);
    }

    pub fn cluster(&self) -> &Arc<ClusterContext> {
        &self.cluster
    }

    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// The local store for `store_id`, if this node serves it.
    pub fn local_store(&self, store_id: &str) -> Option<&Arc<dyn BackingStore>> {
        self.stores.get(store_id)
    }

    pub fn local_stores(&self) -> impl Iterator<Item = &Arc<dyn BackingStore>> {
        self.stores.values()
    }

    /// Number of records currently cached.
    pub fn object_count(&self) -> usize {
        self.records.len()
    }

    pub fn stats(&self) -> ReplicationStats {
        let c = &self.counters;
        ReplicationStats {
            records: self.records.len(),
            hits: c.hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            writes: c.writes.load(Ordering::Relaxed),
            skipped_writes: c.skipped_writes.load(Ordering::Relaxed),
            touches: c.touches.load(Ordering::Relaxed),
        }
    }

    fn default_expire_ms(&self, store_id: &str) -> u64 {
        self.expire_intervals
            .get(store_id)
            .copied()
            .unwrap_or(self.config.expire_interval.as_millis() as u64)
    }

    /// Returns the record for `key`, creating it on first use.
    pub fn record(&self, key: &ObjectKey) -> Arc<ObjectRecord> {
        if let Some(record) = self.records.get(key) {
            return record.clone();
        }

        let key_hash = key.hash64();
        let group = self.cluster.group_for(key_hash);
        let is_primary_here = group
            .primary(self.cluster.owner_tag(key_hash))
            .is_self();
        let expire_ms = self.default_expire_ms(&key.store_id);

        self.records
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(ObjectRecord::new(
                    key.clone(),
                    key_hash,
                    is_primary_here,
                    expire_ms,
                    now_millis(),
                ))
            })
            .clone()
    }

    /// Locks the tracked record for `key`. A record removed while the caller
    /// waited for its lock is skipped and the key is looked up again.
    async fn lock_live(&self, key: &ObjectKey) -> (Arc<ObjectRecord>, OwnedMutexGuard<RecordState>) {
        loop {
            let record = self.record(key);
            let state = record.state.clone().lock_owned().await;
            if !state.removed {
                return (record, state);
            }
        }
    }

    /// The store that talks to `server` about `key`: local for this node, RPC otherwise.
    fn store_for(
        &self,
        server: &Arc<ClusterServer>,
        key: &ObjectKey,
    ) -> Result<Arc<dyn BackingStore>, TriadError> {
        if server.is_self() {
            self.stores
                .get(&key.store_id)
                .cloned()
                .ok_or_else(|| TriadError::StoreNotConfigured(key.store_id.clone()))
        } else {
            Ok(Arc::new(RemoteStore::new(server.clone())))
        }
    }

    fn owners(&self, record: &ObjectRecord) -> Vec<Arc<ClusterServer>> {
        self.cluster
            .group_for(record.key_hash())
            .owners(record.owner_tag())
            .into_iter()
            .cloned()
            .collect()
    }

    // --- Load ---

    /// Returns the current payload of `key`, or `None` if no owner can provide it.
    pub async fn load(&self, key: &ObjectKey) -> Option<Bytes> {
        let (record, mut state) = self.lock_live(key).await;
        let now = now_millis();
        let ttl_ms = self.config.remote_cache_ttl.as_millis() as u64;

        if !self.config.always_load && record.is_servable(&state, now, ttl_ms) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            state.accessed_at = now;
            return state.payload.clone();
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        match self.fetch(&record).await {
            Ok(Some(object)) => {
                self.counters.loads.fetch_add(1, Ordering::Relaxed);
                state.payload = Some(object.data.clone());
                state.content_hash = Some(object.content_hash);
                state.valid = true;
                state.changed = false;
                state.loaded_at = now;
                state.accessed_at = now;
                state.last_persisted_access = object.accessed_at;
                state.expire_interval_ms = object.expire_interval_ms;
                Some(object.data)
            }
            Ok(None) => {
                debug!("Object {} not found at its owners", key);
                state.valid = false;
                state.payload = None;
                state.content_hash = None;
                None
            }
            Err(e) => {
                self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
                debug!("Load of {} failed: {}", key, e);
                state.valid = false;
                None
            }
        }
    }

    /// Loads and decodes a value written with `store_value`.
    pub async fn load_value<T: DeserializeOwned>(&self, key: &ObjectKey) -> Option<T> {
        let data = self.load(key).await?;
        match bincode::serde::decode_from_slice::<T, _>(&data, wire_config()) {
            Ok((value, _)) => Some(value),
            Err(e) => {
                warn!("Could not decode object {}: {}", key, e);
                None
            }
        }
    }

    /// Reads the object from the best live owner, retrying once on another owner
    /// when the first choice is unreachable.
    async fn fetch(&self, record: &ObjectRecord) -> Result<Option<StoredObject>, TriadError> {
        let group = self.cluster.group_for(record.key_hash());
        let tag = record.owner_tag();

        let Some(owner) = group.pick_active(tag, None) else {
            return Err(TriadError::Unreachable(record.key().to_string()));
        };
        let result = self.store_for(owner, record.key())?.get(record.key()).await;

        match result {
            Err(e) if e.is_transport() || matches!(e, TriadError::RemoteBusy(_)) => {
                let Some(fallback) = group.pick_active(tag, Some(owner.member_index())) else {
                    return Err(e);
                };
                debug!(
                    "Load of {} from {} failed ({}), trying {}",
                    record.key(),
                    owner.id(),
                    e,
                    fallback.id()
                );
                self.store_for(fallback, record.key())?
                    .get(record.key())
                    .await
            }
            other => other,
        }
    }

    // --- Store ---

    /// Writes `data` to every owner unless it is unchanged since the last write.
    ///
    /// An empty payload for a key this node is not tracking is not written and
    /// creates no record.
    pub async fn store(&self, key: &ObjectKey, data: Bytes) -> StoreOutcome {
        if data.is_empty() && !self.records.contains_key(key) {
            self.counters.skipped_writes.fetch_add(1, Ordering::Relaxed);
            return StoreOutcome::Unchanged;
        }
        let (record, mut state) = self.lock_live(key).await;
        if state.inert {
            return StoreOutcome::NonSerializable;
        }
        self.write_locked(&record, &mut state, data).await
    }

    /// Serializes `value` and stores it.
    ///
    /// A value that fails to serialize marks the record inert: the failure is logged
    /// once and every later store of the key is skipped.
    pub async fn store_value<T: Serialize>(&self, key: &ObjectKey, value: &T) -> StoreOutcome {
        let encoded = bincode::serde::encode_to_vec(value, wire_config()).map_err(|e| e.to_string());
        if matches!(&encoded, Ok(data) if data.is_empty()) && !self.records.contains_key(key) {
            self.counters.skipped_writes.fetch_add(1, Ordering::Relaxed);
            return StoreOutcome::Unchanged;
        }

        let (record, mut state) = self.lock_live(key).await;
        if state.inert {
            return StoreOutcome::NonSerializable;
        }

        match encoded {
            Ok(data) => self.write_locked(&record, &mut state, Bytes::from(data)).await,
            Err(e) => {
                warn!(
                    "Object {} cannot be serialized and will not be replicated: {}",
                    key, e
                );
                state.inert = true;
                state.valid = false;
                StoreOutcome::NonSerializable
            }
        }
    }

    /// Records a new payload in memory only. It is written by `flush` or when the
    /// record is evicted.
    pub async fn update(&self, key: &ObjectKey, data: Bytes) {
        let (_record, mut state) = self.lock_live(key).await;
        state.payload = Some(data);
        state.changed = true;
        state.accessed_at = now_millis();
    }

    /// Writes a payload recorded by `update`.
    pub async fn flush(&self, key: &ObjectKey) -> StoreOutcome {
        let Some(record) = self.records.get(key).map(|r| r.clone()) else {
            return StoreOutcome::Unchanged;
        };
        let mut state = record.state.lock().await;
        self.flush_locked(&record, &mut state).await
    }

    async fn flush_locked(&self, record: &ObjectRecord, state: &mut RecordState) -> StoreOutcome {
        if state.removed {
            return StoreOutcome::Unchanged;
        }
        if state.inert {
            return StoreOutcome::NonSerializable;
        }
        if !state.changed {
            return StoreOutcome::Unchanged;
        }
        let Some(data) = state.payload.clone() else {
            state.changed = false;
            return StoreOutcome::Unchanged;
        };
        self.write_locked(record, state, data).await
    }

    async fn write_locked(
        &self,
        record: &ObjectRecord,
        state: &mut RecordState,
        data: Bytes,
    ) -> StoreOutcome {
        let now = now_millis();
        let hash = ContentHash::of(&data);
        state.accessed_at = now;

        if !self.config.always_save && state.content_hash == Some(hash) {
            self.counters.skipped_writes.fetch_add(1, Ordering::Relaxed);
            state.payload = Some(data);
            state.changed = false;
            return StoreOutcome::Unchanged;
        }

        let group = self.cluster.group_for(record.key_hash());
        let Some(authoritative) = group.pick_active(record.owner_tag(), None).cloned() else {
            return StoreOutcome::Unavailable;
        };
        let owners = self.owners(record);
        let expire_ms = state.expire_interval_ms;

        let writes = owners.iter().map(|owner| {
            let data = data.clone();
            async move {
                let result = match self.store_for(owner, record.key()) {
                    Ok(store) => store.put(record.key(), data, hash, expire_ms).await,
                    Err(e) => Err(e),
                };
                (owner.index(), result)
            }
        });

        let mut accepted = false;
        for (index, result) in join_all(writes).await {
            match result {
                Ok(()) => {
                    if index == authoritative.index() {
                        accepted = true;
                    }
                }
                Err(e) => debug!(
                    "Write of {} to server #{} failed: {}",
                    record.key(),
                    index,
                    e
                ),
            }
        }

        if !accepted {
            warn!(
                "Write of {} was not accepted by {}; will retry on next store",
                record.key(),
                authoritative.id()
            );
            state.payload = Some(data);
            state.changed = true;
            return StoreOutcome::Unavailable;
        }

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        state.payload = Some(data);
        state.content_hash = Some(hash);
        state.changed = false;
        state.valid = record.is_primary_here();
        state.loaded_at = now;
        state.last_persisted_access = now;
        StoreOutcome::Written
    }

    // --- Access / expiry ---

    /// Records an access. Owners are only told once per access window.
    pub async fn access(&self, key: &ObjectKey) {
        let (record, mut state) = self.lock_live(key).await;
        let now = now_millis();
        state.accessed_at = now;

        if !state.access_is_due(now) {
            return;
        }
        state.last_persisted_access = now;
        self.counters.touches.fetch_add(1, Ordering::Relaxed);

        let owners = self.owners(&record);
        let touches = owners.iter().map(|owner| async move {
            match self.store_for(owner, key) {
                Ok(store) => store.touch(key, now).await,
                Err(e) => Err(e),
            }
        });
        for result in join_all(touches).await {
            if let Err(e) = result {
                debug!("Touch of {} failed: {}", key, e);
            }
        }
    }

    /// Changes the expire interval used by the next write of `key`.
    pub async fn set_expire_interval(&self, key: &ObjectKey, expire_interval_ms: u64) {
        let (_record, mut state) = self.lock_live(key).await;
        state.expire_interval_ms = expire_interval_ms;
    }

    /// Deletes `key` from the cache and from every owner. Returns whether all
    /// owners confirmed the removal.
    pub async fn remove(&self, key: &ObjectKey) -> bool {
        // The live record stays locked until every owner has answered, so a
        // caller waiting on it observes the removal and starts over.
        let record = self.records.get(key).map(|r| r.clone());
        let mut state = match &record {
            Some(record) => Some(record.state.lock().await),
            None => None,
        };

        let key_hash = key.hash64();
        let owners: Vec<Arc<ClusterServer>> = self
            .cluster
            .group_for(key_hash)
            .owners(self.cluster.owner_tag(key_hash))
            .into_iter()
            .cloned()
            .collect();
        let removals = owners.iter().map(|owner| async move {
            match self.store_for(owner, key) {
                Ok(store) => store.remove(key).await,
                Err(e) => Err(e),
            }
        });

        let mut all_ok = true;
        for result in join_all(removals).await {
            if let Err(e) = result {
                debug!("Remove of {} failed: {}", key, e);
                all_ok = false;
            }
        }

        if let (Some(record), Some(state)) = (&record, state.as_mut()) {
            state.removed = true;
            state.valid = false;
            state.changed = false;
            state.payload = None;
            state.content_hash = None;
            self.records
                .remove_if(key, |_, current| Arc::ptr_eq(current, record));
        }
        drop(state);
        all_ok
    }

    /// Deletes expired objects from every local store and drops idle records,
    /// writing any change they still owe first. Returns the number of store
    /// entries deleted.
    pub async fn sweep_expired(&self, now: u64) -> usize {
        let mut deleted = 0;
        for store in self.stores.values() {
            match store.sweep_expired(now).await {
                Ok(n) => deleted += n,
                Err(e) => warn!("Expiry sweep of store '{}' failed: {}", store.id(), e),
            }
        }

        let records: Vec<Arc<ObjectRecord>> =
            self.records.iter().map(|r| r.value().clone()).collect();
        let mut evicted = 0;
        for record in records {
            // A record that is busy is not idle.
            let Ok(mut state) = record.state.try_lock() else {
                continue;
            };
            if !state.is_idle(now) {
                continue;
            }
            if state.changed {
                let outcome = self.flush_locked(&record, &mut state).await;
                if outcome == StoreOutcome::Unavailable {
                    continue;
                }
            }
            self.evict(&record, state);
            evicted += 1;
        }

        if deleted > 0 || evicted > 0 {
            info!(
                "Expiry sweep deleted {} stored object(s) and evicted {} idle record(s)",
                deleted, evicted
            );
        }
        deleted
    }

    fn evict(&self, record: &Arc<ObjectRecord>, mut state: MutexGuard<'_, RecordState>) {
        state.removed = true;
        self.records
            .remove_if(record.key(), |_, current| Arc::ptr_eq(current, record));
        drop(state);
    }
}
