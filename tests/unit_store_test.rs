// tests/unit_store_test.rs

//! Tests for the memory and file backing stores and the store registry.

use bytes::Bytes;
use futures::FutureExt;
use std::sync::Arc;
use std::path::PathBuf;
use triadstore::core::TriadError;
use triadstore::core::hash::ContentHash;
use triadstore::core::store::{
    BackingStore, FileStore, MemoryStore, ObjectKey, StoreConfig, StoreRegistry, is_expired,
};

const HOUR_MS: u64 = 60 * 60 * 1000;

fn key(id: &str) -> ObjectKey {
    ObjectKey::new("session", id)
}

async fn put(store: &dyn BackingStore, id: &str, data: &'static [u8], expire_ms: u64) {
    store
        .put(&key(id), Bytes::from_static(data), ContentHash::of(data), expire_ms)
        .await
        .unwrap();
}

#[test]
fn test_expiry_threshold_is_five_quarters() {
    assert!(!is_expired(1000, 4000, 6000));
    assert!(is_expired(1000, 4000, 6001));
}

// ===== MemoryStore =====

#[tokio::test]
async fn test_memory_store_get_put_remove() {
    let store = MemoryStore::new("session");
    assert_eq!(store.get(&key("a")).await.unwrap(), None);

    put(&store, "a", b"hello", HOUR_MS).await;
    let object = store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(object.data, Bytes::from_static(b"hello"));
    assert_eq!(object.content_hash, ContentHash::of(b"hello"));
    assert_eq!(object.expire_interval_ms, HOUR_MS);
    assert!(object.accessed_at > 0);

    store.remove(&key("a")).await.unwrap();
    assert_eq!(store.get(&key("a")).await.unwrap(), None);
    assert_eq!(store.object_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_memory_store_deduplicates_content() {
    let store = MemoryStore::new("session");
    put(&store, "a", b"same", HOUR_MS).await;
    put(&store, "b", b"same", HOUR_MS).await;
    assert_eq!(store.object_count().await.unwrap(), 2);
    assert_eq!(store.blob_count(), 1);

    store.remove(&key("a")).await.unwrap();
    assert_eq!(store.blob_count(), 1);
    store.remove(&key("b")).await.unwrap();
    assert_eq!(store.blob_count(), 0);
}

#[tokio::test]
async fn test_memory_store_overwrite_releases_old_blob() {
    let store = MemoryStore::new("session");
    put(&store, "a", b"first", HOUR_MS).await;
    put(&store, "a", b"second", HOUR_MS).await;
    assert_eq!(store.blob_count(), 1);
    assert_eq!(store.put_count(), 2);
    let object = store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(object.data, Bytes::from_static(b"second"));
}

#[tokio::test]
async fn test_memory_store_touch_never_moves_backwards() {
    let store = MemoryStore::new("session");
    put(&store, "a", b"x", HOUR_MS).await;
    let written = store.get(&key("a")).await.unwrap().unwrap().accessed_at;

    store.touch(&key("a"), written + 5000).await.unwrap();
    store.touch(&key("a"), written + 10).await.unwrap();
    store.touch(&key("missing"), written).await.unwrap();

    let object = store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(object.accessed_at, written + 5000);
    assert_eq!(store.touch_count(), 3);
}

#[tokio::test]
async fn test_memory_store_sweeps_expired_objects() {
    let store = MemoryStore::new("session");
    put(&store, "short", b"x", 1000).await;
    put(&store, "long", b"y", HOUR_MS).await;
    let written = store.get(&key("short")).await.unwrap().unwrap().accessed_at;

    assert_eq!(store.sweep_expired(written + 1250).await.unwrap(), 0);
    assert_eq!(store.sweep_expired(written + 1251).await.unwrap(), 1);
    assert_eq!(store.get(&key("short")).await.unwrap(), None);
    assert!(store.get(&key("long")).await.unwrap().is_some());
    assert_eq!(store.blob_count(), 1);
}

// ===== FileStore =====

async fn open_file_store(dir: &tempfile::TempDir) -> FileStore {
    FileStore::open("session", dir.path(), 1024 * 1024).await.unwrap()
}

fn blob_files(root: &std::path::Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for shard in std::fs::read_dir(root.join("blobs")).unwrap() {
        for blob in std::fs::read_dir(shard.unwrap().path()).unwrap() {
            files.push(blob.unwrap().path());
        }
    }
    files
}

#[tokio::test]
async fn test_file_store_round_trip_and_layout() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_file_store(&dir).await;

    put(&store, "a", b"hello", HOUR_MS).await;
    let object = store.get(&key("a")).await.unwrap().unwrap();
    assert_eq!(object.data, Bytes::from_static(b"hello"));

    let hex = ContentHash::of(b"hello").to_hex();
    let blob = dir.path().join("blobs").join(&hex[..2]).join(&hex);
    assert_eq!(std::fs::read(blob).unwrap(), b"hello");
    assert!(dir.path().join("manifest.jsonl").exists());
}

#[tokio::test]
async fn test_file_store_deduplicates_and_deletes_unreferenced_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_file_store(&dir).await;

    put(&store, "a", b"shared", HOUR_MS).await;
    put(&store, "b", b"shared", HOUR_MS).await;
    assert_eq!(store.blob_count().await, 1);
    assert_eq!(blob_files(dir.path()).len(), 1);

    store.remove(&key("a")).await.unwrap();
    assert_eq!(blob_files(dir.path()).len(), 1);
    store.remove(&key("b")).await.unwrap();
    assert!(blob_files(dir.path()).is_empty());
    assert_eq!(store.object_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_file_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_file_store(&dir).await;
        put(&store, "kept", b"kept value", HOUR_MS).await;
        put(&store, "gone", b"gone value", HOUR_MS).await;
        put(&store, "moved", b"old", HOUR_MS).await;
        put(&store, "moved", b"new", HOUR_MS).await;
        store.remove(&key("gone")).await.unwrap();
        let written = store.get(&key("kept")).await.unwrap().unwrap().accessed_at;
        store.touch(&key("kept"), written + 42).await.unwrap();
    }

    let store = open_file_store(&dir).await;
    assert_eq!(store.object_count().await.unwrap(), 2);
    let kept = store.get(&key("kept")).await.unwrap().unwrap();
    assert_eq!(kept.data, Bytes::from_static(b"kept value"));
    let moved = store.get(&key("moved")).await.unwrap().unwrap();
    assert_eq!(moved.data, Bytes::from_static(b"new"));
    assert_eq!(store.get(&key("gone")).await.unwrap(), None);

    let reopened_at = kept.accessed_at;
    store.touch(&key("kept"), reopened_at + 1).await.unwrap();
    assert_eq!(
        store.get(&key("kept")).await.unwrap().unwrap().accessed_at,
        reopened_at + 1
    );
}

#[tokio::test]
async fn test_file_store_skips_corrupt_manifest_lines() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = open_file_store(&dir).await;
        put(&store, "a", b"value", HOUR_MS).await;
    }
    let manifest = dir.path().join("manifest.jsonl");
    let mut contents = std::fs::read_to_string(&manifest).unwrap();
    contents.push_str("this is not json\n");
    std::fs::write(&manifest, contents).unwrap();

    let store = open_file_store(&dir).await;
    assert_eq!(store.object_count().await.unwrap(), 1);
    assert!(store.get(&key("a")).await.unwrap().is_some());
}

#[tokio::test]
async fn test_file_store_sweeps_expired_objects() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_file_store(&dir).await;
    put(&store, "a", b"value", 1000).await;
    let written = store.get(&key("a")).await.unwrap().unwrap().accessed_at;

    assert_eq!(store.sweep_expired(written + 2000).await.unwrap(), 1);
    assert!(blob_files(dir.path()).is_empty());
}

// ===== StoreRegistry =====

#[tokio::test]
async fn test_registry_opens_default_kinds() {
    let registry = StoreRegistry::with_defaults();
    let mut kinds: Vec<&str> = registry.kinds().collect();
    kinds.sort();
    assert_eq!(kinds, ["file", "memory"]);

    let memory = registry.open(&StoreConfig::memory("session")).await.unwrap();
    assert_eq!(memory.id(), "session");

    let dir = tempfile::tempdir().unwrap();
    let file_config = StoreConfig {
        kind: "file".to_string(),
        path: Some(dir.path().to_path_buf()),
        ..StoreConfig::memory("files")
    };
    let stores = registry.open_all(&[file_config]).await.unwrap();
    assert_eq!(stores["files"].id(), "files");
}

#[tokio::test]
async fn test_registry_rejects_unknown_kind() {
    let registry = StoreRegistry::with_defaults();
    let config = StoreConfig {
        kind: "jdbc".to_string(),
        ..StoreConfig::memory("session")
    };
    let err = registry.open(&config).await.unwrap_err();
    assert_eq!(err, TriadError::StoreNotConfigured("jdbc".to_string()));
}

#[tokio::test]
async fn test_registry_file_store_requires_path() {
    let registry = StoreRegistry::with_defaults();
    let config = StoreConfig {
        kind: "file".to_string(),
        ..StoreConfig::memory("session")
    };
    let err = registry.open(&config).await.unwrap_err();
    assert!(matches!(err, TriadError::StoreNotConfigured(_)));
}

#[tokio::test]
async fn test_registry_accepts_custom_factories() {
    let mut registry = StoreRegistry::new();
    registry.register(
        "scratch",
        Box::new(|config: StoreConfig| {
            async move {
                Ok::<_, TriadError>(
                    Arc::new(MemoryStore::new(format!("scratch-{}", config.id))) as Arc<dyn BackingStore>,
                )
            }
            .boxed()
        }),
    );
    let config = StoreConfig {
        kind: "scratch".to_string(),
        ..StoreConfig::memory("tmp")
    };
    assert_eq!(registry.open(&config).await.unwrap().id(), "scratch-tmp");
    assert!(registry.open(&StoreConfig::memory("tmp")).await.is_err());
}
