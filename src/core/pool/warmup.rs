// src/core/pool/warmup.rs

//! The warmup ramp: how many connections a recovering target may hold.

/// Number of chunks the warmup period is divided into. A level at or above this
/// value means unrestricted admission.
pub const WARMUP_MAX: i32 = 16;

/// Lowest degraded level reachable through repeated failures.
pub const WARMUP_MIN: i32 = -16;

/// Maximum total (active + starting + idle) connections at each warmup step.
pub const WARMUP_CONNECTION_MAX: [usize; WARMUP_MAX as usize] =
    [1, 1, 1, 1, 2, 2, 2, 2, 4, 4, 8, 8, 16, 32, 64, 128];

/// Failures closer together than this only degrade the level once.
pub const DEGRADE_INTERVAL_MS: u64 = 100;

/// Width of one warmup or fail-recover chunk.
pub fn chunk_ms(total_ms: u64) -> u64 {
    (total_ms / WARMUP_MAX as u64).max(1)
}

/// The ramp step reached `elapsed_ms` after the first success, clamped to `[0, 16]`.
pub fn step_for_elapsed(elapsed_ms: u64, chunk_ms: u64) -> i32 {
    let step = elapsed_ms / chunk_ms.max(1);
    step.min(WARMUP_MAX as u64) as i32
}

/// The connection cap at `level`, or `None` when the level is unrestricted.
///
/// Negative levels are gated by time, not by count, so they map to the first step.
pub fn connection_cap(level: i32) -> Option<usize> {
    if level >= WARMUP_MAX {
        None
    } else {
        Some(WARMUP_CONNECTION_MAX[level.max(0) as usize])
    }
}
