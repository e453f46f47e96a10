// tests/integration/cluster_test.rs

//! Tests for the cluster view: grouping, ownership and pool lifecycle.

use super::test_helpers::{MockConnector, TestNode, key_with_primary, loopback_servers};
use std::collections::HashSet;
use std::sync::Arc;
use triadstore::core::cluster::ClusterContext;
use triadstore::core::pool::{AcquireMode, PoolState};
use triadstore::core::replication::ReplicationConfig;
use triadstore::core::store::ObjectKey;
use triadstore::core::triad::TriadMember;

fn node(self_id: &str, ids: &[&str]) -> TestNode {
    TestNode::build(
        self_id,
        &loopback_servers(ids),
        Arc::new(MockConnector::new()),
        ReplicationConfig::default(),
        60 * 60 * 1000,
        16,
    )
}

#[test]
fn test_servers_are_grouped_in_triads() {
    let node = node("s3", &["s0", "s1", "s2", "s3", "s4"]);
    let cluster = &node.cluster;

    assert_eq!(cluster.servers().len(), 5);
    assert_eq!(cluster.groups().len(), 2);
    assert_eq!(cluster.groups()[0].len(), 3);
    assert_eq!(cluster.groups()[1].len(), 2);
    assert_eq!(cluster.self_index(), 3);
    assert_eq!(cluster.self_server().id(), "s3");
    assert_eq!(cluster.server_by_id("s4").unwrap().index(), 4);
    assert!(cluster.server_by_id("s9").is_none());
}

#[test]
fn test_unknown_self_id_is_rejected() {
    let servers = loopback_servers(&["s0", "s1"]);
    let result = ClusterContext::new(
        "ghost",
        &super::test_helpers::cluster_config(&servers),
        &super::test_helpers::fast_pool_config(),
        Arc::new(MockConnector::new()),
    );
    assert!(result.is_err());
}

#[test]
fn test_every_key_has_distinct_owners_in_its_group() {
    let node = node("s0", &["s0", "s1", "s2", "s3", "s4"]);
    let cluster = &node.cluster;

    for i in 0..200 {
        let key = ObjectKey::new("session", format!("k{i}"));
        let hash = key.hash64();
        let group = cluster.group_for(hash);
        let owners = group.owners(cluster.owner_tag(hash));

        let indices: HashSet<usize> = owners.iter().map(|s| s.member_index()).collect();
        assert_eq!(indices.len(), owners.len());
        assert_eq!(owners.len(), group.len());
        assert_eq!(
            owners[0].member_index(),
            group.primary(cluster.owner_tag(hash)).member_index()
        );
    }
}

#[test]
fn test_every_server_is_primary_for_some_key() {
    let node = node("s0", &["s0", "s1", "s2", "s3"]);
    for id in ["s0", "s1", "s2", "s3"] {
        let key = key_with_primary(&node.cluster, id);
        let hash = key.hash64();
        let primary = node
            .cluster
            .group_for(hash)
            .primary(node.cluster.owner_tag(hash))
            .id()
            .to_string();
        assert_eq!(primary, id);
    }
}

#[test]
fn test_self_is_always_active() {
    let node = node("s0", &["s0", "s1"]);
    let me = node.cluster.self_server();
    me.pool().to_fail();
    assert!(me.is_active());

    let peer = node.cluster.server_by_id("s1").unwrap();
    peer.pool().to_fail();
    assert!(!peer.is_active());
}

#[tokio::test]
async fn test_close_shuts_every_pool() {
    let node = node("s0", &["s0", "s1", "s2"]);
    node.cluster.close();

    for server in node.cluster.servers() {
        assert_eq!(server.pool().state(), PoolState::Closed);
        assert!(server.pool().acquire(AcquireMode::ForceLoadBalance).await.is_none());
    }
}
