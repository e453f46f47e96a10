// src/core/clock.rs

//! Millisecond wall clock shared by the pool and the object cache.
//!
//! The clock is anchored to `SystemTime` once and then advanced with tokio's
//! `Instant`, so tests running on a paused runtime move it with `tokio::time::advance`.

use once_cell::sync::Lazy;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

static ANCHOR: Lazy<(u64, Instant)> = Lazy::new(|| {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    (wall, Instant::now())
});

/// Returns the current time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    let (wall, instant) = *ANCHOR;
    wall + instant.elapsed().as_millis() as u64
}
