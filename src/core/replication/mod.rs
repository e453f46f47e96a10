// src/core/replication/mod.rs

//! The distributed object cache: per-object records replicated across triads.

pub mod config;
pub mod manager;
pub mod record;

pub use config::ReplicationConfig;
pub use manager::{ReplicationManager, ReplicationStats, StoreOutcome};
pub use record::{ObjectRecord, access_window_ms};
