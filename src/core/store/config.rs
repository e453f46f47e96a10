// src/core/store/config.rs

//! Defines the configuration of one storage domain.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Holds the settings for one `[[stores]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// The storage domain, e.g. `session`. Object keys carry it as `store_id`.
    pub id: String,
    /// Which registered factory builds the store (`memory` or `file`).
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Directory for file-backed stores.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Objects idle longer than this expire. Used as the default expire interval.
    #[serde(with = "humantime_serde", default = "default_max_idle_time")]
    pub max_idle_time: Duration,
    /// Byte budget of the in-memory value cache of file-backed stores.
    #[serde(default = "default_value_cache_bytes")]
    pub value_cache_bytes: usize,
}

impl StoreConfig {
    /// A memory store with default settings.
    pub fn memory(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: default_kind(),
            path: None,
            max_idle_time: default_max_idle_time(),
            value_cache_bytes: default_value_cache_bytes(),
        }
    }
}

fn default_kind() -> String {
    "memory".to_string()
}
fn default_max_idle_time() -> Duration {
    Duration::from_secs(3 * 60 * 60)
}
fn default_value_cache_bytes() -> usize {
    64 * 1024 * 1024
}
