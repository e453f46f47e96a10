// tests/property_test.rs

//! Property-based tests for triadstore
//!
//! These tests use property-based testing to verify invariants of owner
//! resolution and of the pool's warmup and failure bookkeeping that should hold
//! for any input.

#[path = "integration/test_helpers.rs"]
mod test_helpers;

mod property {
    pub mod pool_test;
    pub mod triad_test;
}
