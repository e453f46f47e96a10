// src/core/pool/stats.rs

//! Counters and point-in-time status for a connection pool.

use super::state::PoolState;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lifetime counters for one pool. Updated without taking the pool lock.
#[derive(Debug, Default)]
pub struct PoolStats {
    connect_count: AtomicU64,
    keepalive_count: AtomicU64,
    fail_count: AtomicU64,
    busy_count: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new transport connection was opened.
    pub fn increment_connects(&self) {
        self.connect_count.fetch_add(1, Ordering::Relaxed);
    }

    /// An idle connection was reused.
    pub fn increment_keepalives(&self) {
        self.keepalive_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fails(&self) {
        self.fail_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_busy(&self) {
        self.busy_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::Relaxed)
    }

    pub fn keepalive_count(&self) -> u64 {
        self.keepalive_count.load(Ordering::Relaxed)
    }

    pub fn fail_count(&self) -> u64 {
        self.fail_count.load(Ordering::Relaxed)
    }

    pub fn busy_count(&self) -> u64 {
        self.busy_count.load(Ordering::Relaxed)
    }
}

/// A serializable view of a pool, used for status logging.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub target: String,
    pub address: String,
    pub state: PoolState,
    pub warmup_level: i32,
    pub active: usize,
    pub starting: usize,
    pub idle: usize,
    pub latency_factor: f64,
    pub dynamic_fail_recover_ms: u64,
    pub last_fail_at: u64,
    pub last_busy_at: u64,
    pub last_success_at: u64,
    pub connect_count: u64,
    pub keepalive_count: u64,
    pub fail_count: u64,
    pub busy_count: u64,
    pub weight: u32,
    pub load_balance_allocations: usize,
}
