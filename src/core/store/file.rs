// src/core/store/file.rs

//! A content-addressed backing store on the local filesystem.
//!
//! Layout under the store root:
//!
//! - `blobs/<hh>/<hex>` holds one file per distinct content hash, where `<hex>` is
//!   the SHA-256 of the payload and `<hh>` its first two characters.
//! - `manifest.jsonl` is an append-only log of index operations. It is replayed
//!   when the store is opened and rewritten when it has grown well past the live
//!   index.
//!
//! Blob reference counts are derived from the index, so a blob is deleted as soon
//! as the last object pointing at it is removed or rewritten. Recently read or
//! written payloads are kept in an LRU cache bounded by a byte budget.

use super::{BackingStore, ObjectKey, StoredObject, is_expired};
use crate::core::TriadError;
use crate::core::clock::now_millis;
use crate::core::hash::ContentHash;
use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File as TokioFile, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "manifest.jsonl";
const BLOB_DIR: &str = "blobs";
/// The manifest is never compacted below this many operations.
const COMPACT_MIN_OPS: usize = 1024;

/// One line of the manifest.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum ManifestOp {
    Put {
        key: ObjectKey,
        hash: String,
        accessed_at: u64,
        expire_interval_ms: u64,
    },
    Touch {
        key: ObjectKey,
        accessed_at: u64,
    },
    Remove {
        key: ObjectKey,
    },
}

#[derive(Debug, Clone)]
struct IndexEntry {
    content_hash: ContentHash,
    accessed_at: u64,
    expire_interval_ms: u64,
}

#[derive(Debug)]
struct FileState {
    index: HashMap<ObjectKey, IndexEntry>,
    refs: HashMap<ContentHash, usize>,
    manifest: BufWriter<TokioFile>,
    manifest_ops: usize,
    /// Set when a manifest write failed part way. The manifest is rebuilt from
    /// the index before anything else is appended.
    manifest_stale: bool,
}

/// An LRU of payloads keyed by content hash, evicting by total byte size.
#[derive(Debug)]
struct ValueCache {
    entries: LruCache<ContentHash, Bytes>,
    bytes: usize,
    budget: usize,
}

impl ValueCache {
    fn new(budget: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            budget,
        }
    }

    fn get(&mut self, hash: &ContentHash) -> Option<Bytes> {
        self.entries.get(hash).cloned()
    }

    fn insert(&mut self, hash: ContentHash, data: Bytes) {
        if data.len() > self.budget {
            return;
        }
        if let Some(old) = self.entries.put(hash, data.clone()) {
            self.bytes -= old.len();
        }
        self.bytes += data.len();
        while self.bytes > self.budget {
            match self.entries.pop_lru() {
                Some((_, evicted)) => self.bytes -= evicted.len(),
                None => break,
            }
        }
    }

    fn remove(&mut self, hash: &ContentHash) {
        if let Some(old) = self.entries.pop(hash) {
            self.bytes -= old.len();
        }
    }
}

/// Stores objects as deduplicated blob files plus a replayable manifest.
#[derive(Debug)]
pub struct FileStore {
    id: String,
    root: PathBuf,
    state: Mutex<FileState>,
    cache: parking_lot::Mutex<ValueCache>,
}

impl FileStore {
    /// Opens (or creates) the store under `root` and replays its manifest.
    pub async fn open(
        id: impl Into<String>,
        root: impl Into<PathBuf>,
        value_cache_bytes: usize,
    ) -> Result<Self, TriadError> {
        let id = id.into();
        let root = root.into();
        fs::create_dir_all(root.join(BLOB_DIR)).await?;

        let manifest_path = root.join(MANIFEST_FILE);
        let (index, replayed) = replay_manifest(&manifest_path).await?;

        let mut refs: HashMap<ContentHash, usize> = HashMap::new();
        for entry in index.values() {
            *refs.entry(entry.content_hash).or_insert(0) += 1;
        }

        // Start from a compact manifest so replay cost tracks the live index.
        rewrite_manifest(&root, &index).await?;
        let manifest = open_manifest(&manifest_path).await?;

        info!(
            "Opened file store '{}' at {}: {} object(s), {} blob(s), {} manifest op(s) replayed",
            id,
            root.display(),
            index.len(),
            refs.len(),
            replayed
        );

        Ok(Self {
            id,
            state: Mutex::new(FileState {
                manifest_ops: index.len(),
                manifest_stale: false,
                index,
                refs,
                manifest,
            }),
            root,
            cache: parking_lot::Mutex::new(ValueCache::new(value_cache_bytes)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of distinct content blobs referenced by the index.
    pub async fn blob_count(&self) -> usize {
        self.state.lock().await.refs.len()
    }

    fn blob_path(&self, hash: &ContentHash) -> PathBuf {
        blob_path(&self.root, hash)
    }

    /// Writes one operation to the manifest. The in-memory index is only
    /// changed by callers after this succeeds.
    async fn append(&self, state: &mut FileState, op: &ManifestOp) -> Result<(), TriadError> {
        if state.manifest_stale {
            self.compact(state).await?;
        }
        let mut line = serde_json::to_vec(op)?;
        line.push(b'\n');

        let written = match state.manifest.write_all(&line).await {
            Ok(()) => state.manifest.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Manifest write failed in store '{}': {}", self.id, e);
            state.manifest_stale = true;
            return Err(e.into());
        }
        state.manifest_ops += 1;
        Ok(())
    }

    /// Compacts once the manifest has grown well past the live index. A failure
    /// leaves the manifest to be rebuilt by the next append.
    async fn maybe_compact(&self, state: &mut FileState) {
        if state.manifest_ops <= COMPACT_MIN_OPS || state.manifest_ops <= 2 * state.index.len() {
            return;
        }
        if let Err(e) = self.compact(state).await {
            warn!("Could not compact manifest of store '{}': {}", self.id, e);
            state.manifest_stale = true;
        }
    }

    async fn compact(&self, state: &mut FileState) -> Result<(), TriadError> {
        debug!(
            "Compacting manifest of store '{}': {} op(s) for {} object(s)",
            self.id,
            state.manifest_ops,
            state.index.len()
        );
        rewrite_manifest(&self.root, &state.index).await?;
        state.manifest = open_manifest(&self.root.join(MANIFEST_FILE)).await?;
        state.manifest_ops = state.index.len();
        state.manifest_stale = false;
        Ok(())
    }

    /// Drops one reference to `hash`, deleting the blob when it was the last.
    async fn release_blob(&self, state: &mut FileState, hash: &ContentHash) {
        let Some(count) = state.refs.get_mut(hash) else {
            return;
        };
        *count -= 1;
        if *count > 0 {
            return;
        }
        state.refs.remove(hash);
        self.delete_blob(hash).await;
    }

    async fn delete_blob(&self, hash: &ContentHash) {
        self.cache.lock().remove(hash);
        match fs::remove_file(self.blob_path(hash)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!("Could not delete blob {} in store '{}': {}", hash, self.id, e),
        }
    }

    async fn read_blob(&self, hash: &ContentHash) -> Result<Bytes, TriadError> {
        if let Some(data) = self.cache.lock().get(hash) {
            return Ok(data);
        }
        let data = Bytes::from(fs::read(self.blob_path(hash)).await?);
        if ContentHash::of(&data) != *hash {
            return Err(TriadError::Internal(format!(
                "blob {} in store '{}' is corrupt",
                hash, self.id
            )));
        }
        self.cache.lock().insert(*hash, data.clone());
        Ok(data)
    }

    async fn write_blob(&self, hash: &ContentHash, data: &Bytes) -> Result<(), TriadError> {
        let path = self.blob_path(hash);
        if fs::try_exists(&path).await? {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let temp_path = path.with_extension(format!("tmp.{}", rand::random::<u32>()));
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn remove_locked(&self, state: &mut FileState, key: &ObjectKey) -> Result<bool, TriadError> {
        if !state.index.contains_key(key) {
            return Ok(false);
        }
        self.append(state, &ManifestOp::Remove { key: key.clone() })
            .await?;
        if let Some(entry) = state.index.remove(key) {
            self.release_blob(state, &entry.content_hash).await;
        }
        Ok(true)
    }
}

#[async_trait]
impl BackingStore for FileStore {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get(&self, key: &ObjectKey) -> Result<Option<StoredObject>, TriadError> {
        let state = self.state.lock().await;
        let Some(entry) = state.index.get(key).cloned() else {
            return Ok(None);
        };
        let data = self.read_blob(&entry.content_hash).await?;
        Ok(Some(StoredObject {
            data,
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
        let mut state = self.state.lock().await;

        let new_blob = !state.refs.contains_key(&content_hash);
        if new_blob {
            self.write_blob(&content_hash, &data).await?;
        }

        let accessed_at = now_millis();
        let op = ManifestOp::Put {
            key: key.clone(),
            hash: content_hash.to_hex(),
            accessed_at,
            expire_interval_ms,
        };
        if let Err(e) = self.append(&mut state, &op).await {
            if new_blob {
                self.delete_blob(&content_hash).await;
            }
            return Err(e);
        }

        *state.refs.entry(content_hash).or_insert(0) += 1;
        let previous = state.index.insert(
            key.clone(),
            IndexEntry {
                content_hash,
                accessed_at,
                expire_interval_ms,
            },
        );
        if let Some(previous) = previous {
            self.release_blob(&mut state, &previous.content_hash).await;
        }
        self.cache.lock().insert(content_hash, data);
        self.maybe_compact(&mut state).await;
        Ok(())
    }

    async fn touch(&self, key: &ObjectKey, now: u64) -> Result<(), TriadError> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.index.get(key) else {
            return Ok(());
        };
        if now <= entry.accessed_at {
            return Ok(());
        }
        self.append(
            &mut state,
            &ManifestOp::Touch {
                key: key.clone(),
                accessed_at: now,
            },
        )
        .await?;
        if let Some(entry) = state.index.get_mut(key) {
            entry.accessed_at = now;
        }
        self.maybe_compact(&mut state).await;
        Ok(())
    }

    async fn remove(&self, key: &ObjectKey) -> Result<(), TriadError> {
        let mut state = self.state.lock().await;
        self.remove_locked(&mut state, key).await?;
        self.maybe_compact(&mut state).await;
        Ok(())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, TriadError> {
        let mut state = self.state.lock().await;
        let expired: Vec<ObjectKey> = state
            .index
            .iter()
            .filter(|(_, e)| is_expired(e.accessed_at, e.expire_interval_ms, now))
            .map(|(k, _)| k.clone())
            .collect();

        let mut removed = 0;
        for key in &expired {
            if self.remove_locked(&mut state, key).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Store '{}' expired {} object(s)", self.id, removed);
        }
        self.maybe_compact(&mut state).await;
        Ok(removed)
    }

    async fn object_count(&self) -> Result<usize, TriadError> {
        Ok(self.state.lock().await.index.len())
    }
}

fn blob_path(root: &Path, hash: &ContentHash) -> PathBuf {
    let hex = hash.to_hex();
    root.join(BLOB_DIR).join(&hex[..2]).join(hex)
}

/// Rebuilds the index from the manifest. Unreadable lines are skipped.
async fn replay_manifest(
    path: &Path,
) -> Result<(HashMap<ObjectKey, IndexEntry>, usize), TriadError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok((HashMap::new(), 0)),
        Err(e) => return Err(e.into()),
    };

    let mut index = HashMap::new();
    let mut ops = 0;
    for (line_no, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let op: ManifestOp = match serde_json::from_str(line) {
            Ok(op) => op,
            Err(e) => {
                warn!(
                    "Skipping unreadable manifest line {} in {}: {}",
                    line_no + 1,
                    path.display(),
                    e
                );
                continue;
            }
        };
        ops += 1;
        match op {
            ManifestOp::Put {
                key,
                hash,
                accessed_at,
                expire_interval_ms,
            } => {
                let Some(content_hash) = ContentHash::from_hex(&hash) else {
                    warn!("Skipping manifest entry for {} with bad hash '{}'", key, hash);
                    continue;
                };
                index.insert(
                    key,
                    IndexEntry {
                        content_hash,
                        accessed_at,
                        expire_interval_ms,
                    },
                );
            }
            ManifestOp::Touch { key, accessed_at } => {
                if let Some(entry) = index.get_mut(&key) {
                    entry.accessed_at = accessed_at;
                }
            }
            ManifestOp::Remove { key } => {
                index.remove(&key);
            }
        }
    }
    Ok((index, ops))
}

/// Writes one `put` line per live object to a temp file and swaps it in.
async fn rewrite_manifest(
    root: &Path,
    index: &HashMap<ObjectKey, IndexEntry>,
) -> Result<(), TriadError> {
    let path = root.join(MANIFEST_FILE);
    let temp_path = root.join(format!("{MANIFEST_FILE}.tmp.{}", rand::random::<u32>()));

    let mut buf = Vec::new();
    for (key, entry) in index {
        let op = ManifestOp::Put {
            key: key.clone(),
            hash: entry.content_hash.to_hex(),
            accessed_at: entry.accessed_at,
            expire_interval_ms: entry.expire_interval_ms,
        };
        serde_json::to_writer(&mut buf, &op)?;
        buf.push(b'\n');
    }

    fs::write(&temp_path, &buf).await?;
    fs::rename(&temp_path, &path).await?;
    Ok(())
}

async fn open_manifest(path: &Path) -> Result<BufWriter<TokioFile>, TriadError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(BufWriter::new(file))
}

// Swapping the manifest writer needs private access, so these live beside the store.
#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    async fn put_text(store: &FileStore, key: &ObjectKey, text: &str) -> Result<(), TriadError> {
        let data = Bytes::from(text.to_string());
        let hash = ContentHash::of(&data);
        store.put(key, data, hash, 60_000).await
    }

    async fn read_text(store: &FileStore, key: &ObjectKey) -> Option<Bytes> {
        store.get(key).await.unwrap().map(|object| object.data)
    }

    async fn break_manifest(store: &FileStore) {
        let mut state = store.state.lock().await;
        state.manifest = open_manifest(Path::new("/dev/full")).await.unwrap();
        state.manifest_stale = false;
    }

    #[tokio::test]
    async fn test_failed_manifest_write_leaves_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open("session", dir.path(), 1024 * 1024).await.unwrap();
        let k1 = ObjectKey::new("session", "k1");
        let k2 = ObjectKey::new("session", "k2");
        put_text(&store, &k1, "a").await.unwrap();

        break_manifest(&store).await;
        assert!(put_text(&store, &k1, "b").await.is_err());
        assert_eq!(read_text(&store, &k1).await, Some(Bytes::from("a")));
        assert_eq!(store.blob_count().await, 1);
        assert!(!store.blob_path(&ContentHash::of(b"b")).exists());

        // The next write rebuilds the manifest from the index first.
        put_text(&store, &k2, "c").await.unwrap();

        break_manifest(&store).await;
        assert!(store.remove(&k2).await.is_err());
        assert_eq!(read_text(&store, &k2).await, Some(Bytes::from("c")));

        break_manifest(&store).await;
        let accessed_at = store.get(&k1).await.unwrap().unwrap().accessed_at;
        assert!(store.touch(&k1, accessed_at + 10_000).await.is_err());
        assert_eq!(store.get(&k1).await.unwrap().unwrap().accessed_at, accessed_at);

        drop(store);
        let reopened = FileStore::open("session", dir.path(), 1024 * 1024).await.unwrap();
        assert_eq!(read_text(&reopened, &k1).await, Some(Bytes::from("a")));
        assert_eq!(read_text(&reopened, &k2).await, Some(Bytes::from("c")));
        assert_eq!(reopened.object_count().await.unwrap(), 2);
        assert_eq!(reopened.blob_count().await, 2);
    }
}
