// src/core/pool/config.rs

//! Per-target connection pool settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Holds all load-balancing settings for one target server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on establishing a transport connection.
    #[serde(with = "humantime_serde", default = "default_connect_timeout")]
    pub connect_timeout: Duration,
    /// Upper bound on one request/response round trip.
    #[serde(with = "humantime_serde", default = "default_socket_timeout")]
    pub socket_timeout: Duration,
    /// Idle connections older than this are closed instead of reused.
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    /// Length of the post-recovery ramp. Zero skips warmup entirely.
    #[serde(with = "humantime_serde", default = "default_warmup_time")]
    pub warmup_time: Duration,
    /// Ceiling for the dynamic fail-recover backoff.
    #[serde(with = "humantime_serde", default = "default_fail_recover_time")]
    pub fail_recover_time: Duration,
    /// How long a busy signal suppresses session-affinity admission.
    #[serde(with = "humantime_serde", default = "default_busy_recover_time")]
    pub busy_recover_time: Duration,
    /// Cap on active + starting connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Capacity of the idle ring.
    #[serde(default = "default_idle_pool_size")]
    pub idle_pool_size: usize,
    /// Relative load-balance weight.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_socket_timeout() -> Duration {
    Duration::from_secs(30)
}
fn default_idle_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_warmup_time() -> Duration {
    Duration::from_secs(60)
}
fn default_fail_recover_time() -> Duration {
    Duration::from_secs(15)
}
fn default_busy_recover_time() -> Duration {
    Duration::from_secs(15)
}
fn default_max_connections() -> usize {
    1024
}
fn default_idle_pool_size() -> usize {
    16
}
fn default_weight() -> u32 {
    100
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            socket_timeout: default_socket_timeout(),
            idle_timeout: default_idle_timeout(),
            warmup_time: default_warmup_time(),
            fail_recover_time: default_fail_recover_time(),
            busy_recover_time: default_busy_recover_time(),
            max_connections: default_max_connections(),
            idle_pool_size: default_idle_pool_size(),
            weight: default_weight(),
        }
    }
}
