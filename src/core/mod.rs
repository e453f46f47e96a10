// src/core/mod.rs

//! The central module: connection pools, triad ownership, the cluster view, backing
//! stores and the replication manager.

pub mod clock;
pub mod cluster;
pub mod errors;
pub mod hash;
pub mod pool;
pub mod replication;
pub mod store;
pub mod tasks;
pub mod transport;
pub mod triad;

pub use errors::TriadError;
