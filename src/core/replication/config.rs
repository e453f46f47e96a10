// src/core/replication/config.rs

//! Defines the object cache and background task settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Holds the settings of the `[replication]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Expire interval for objects in stores that are not configured on this node.
    #[serde(with = "humantime_serde", default = "default_expire_interval")]
    pub expire_interval: Duration,
    /// How often expired objects and idle records are swept.
    #[serde(with = "humantime_serde", default = "default_idle_check_interval")]
    pub idle_check_interval: Duration,
    /// How long a cached copy owned by another server is served without re-reading.
    #[serde(with = "humantime_serde", default = "default_remote_cache_ttl")]
    pub remote_cache_ttl: Duration,
    /// How often pool health is re-evaluated and failed targets are probed.
    #[serde(with = "humantime_serde", default = "default_health_check_interval")]
    pub health_check_interval: Duration,
    /// Re-read every object from its owner on each load, ignoring the local copy.
    #[serde(default)]
    pub always_load: bool,
    /// Write on every store, even when the payload is unchanged.
    #[serde(default)]
    pub always_save: bool,
}

fn default_expire_interval() -> Duration {
    Duration::from_secs(3 * 60 * 60)
}
fn default_idle_check_interval() -> Duration {
    Duration::from_secs(15 * 60)
}
fn default_remote_cache_ttl() -> Duration {
    Duration::from_secs(5)
}
fn default_health_check_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            expire_interval: default_expire_interval(),
            idle_check_interval: default_idle_check_interval(),
            remote_cache_ttl: default_remote_cache_ttl(),
            health_check_interval: default_health_check_interval(),
            always_load: false,
            always_save: false,
        }
    }
}
