// src/core/tasks/mod.rs

//! Long-running background tasks: pool health maintenance and expiry sweeping.

pub mod expiry_sweeper;
pub mod pool_health;

pub use expiry_sweeper::ExpirySweeperTask;
pub use pool_health::PoolHealthTask;
