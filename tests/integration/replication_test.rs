// tests/integration/replication_test.rs

//! End-to-end replication between two nodes over real TCP connections.

use super::test_helpers::{STORE_ID, key_with_primary, tcp_pair};
use bytes::Bytes;
use std::time::Duration;
use triadstore::core::TriadError;
use triadstore::core::pool::PoolState;
use triadstore::core::replication::StoreOutcome;
use triadstore::core::store::{BackingStore, ObjectKey};

#[tokio::test]
async fn test_store_and_load_over_tcp() {
    let (a, b, shutdown_tx) = tcp_pair(64).await;
    let key = key_with_primary(&a.cluster, "b");

    assert_eq!(
        a.manager.store(&key, Bytes::from_static(b"over the wire")).await,
        StoreOutcome::Written
    );
    let at_b = b.store.get(&key).await.unwrap().expect("b should hold the object");
    assert_eq!(at_b.data, Bytes::from_static(b"over the wire"));
    assert!(a.store.get(&key).await.unwrap().is_some());

    // b changes the object; a does not own it as primary and reads it back from b.
    b.manager.store(&key, Bytes::from_static(b"changed at b")).await;
    assert_eq!(
        a.manager.load(&key).await,
        Some(Bytes::from_static(b"changed at b"))
    );

    let pool = a.cluster.server_by_id("b").unwrap().pool().clone();
    assert!(pool.state().is_live());
    assert!(pool.stats().connect_count() >= 1);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_remove_over_tcp() {
    let (a, b, shutdown_tx) = tcp_pair(64).await;
    let key = ObjectKey::new(STORE_ID, "doomed");
    a.manager.store(&key, Bytes::from_static(b"x")).await;

    assert!(a.manager.remove(&key).await);
    assert_eq!(b.store.get(&key).await.unwrap(), None);
    assert_eq!(a.store.get(&key).await.unwrap(), None);

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_busy_peer_backs_off_and_self_takes_over() {
    let (a, b, shutdown_tx) = tcp_pair(0).await;
    let key = key_with_primary(&a.cluster, "b");
    let pool = a.cluster.server_by_id("b").unwrap().pool().clone();

    // b answers every request with Busy, so its write is never accepted.
    assert_eq!(
        a.manager.store(&key, Bytes::from_static(b"x")).await,
        StoreOutcome::Unavailable
    );
    assert_eq!(pool.state(), PoolState::Busy);
    assert_eq!(b.store.put_count(), 0);

    // With b no longer live, a is the authoritative owner.
    assert_eq!(
        a.manager.store(&key, Bytes::from_static(b"x")).await,
        StoreOutcome::Written
    );
    assert!(a.store.get(&key).await.unwrap().is_some());

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_message_without_listener_reports_remote_error() {
    let (a, _b, shutdown_tx) = tcp_pair(64).await;
    let b = a.cluster.server_by_id("b").unwrap();

    assert!(b.ping().await);
    let result = b.message(b"hello".to_vec()).await;
    assert!(matches!(result, Err(TriadError::Remote(msg)) if msg.contains("listener")));

    let _ = shutdown_tx.send(());
}

#[tokio::test]
async fn test_shutdown_stops_serving() {
    let (a, _b, shutdown_tx) = tcp_pair(64).await;
    let b = a.cluster.server_by_id("b").unwrap();
    assert!(b.ping().await);

    shutdown_tx.send(()).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(!b.ping().await);
}
