// tests/integration_test.rs

//! Integration tests for triadstore
//!
//! These tests run several cluster nodes in one process, connected either through
//! an in-process loopback transport or over real TCP sockets, and verify
//! ownership, replication and failure handling end to end.

mod integration {
    pub mod cluster_test;
    pub mod replication_test;
    pub mod test_helpers;
}
