// tests/property/pool_test.rs

//! Property-based tests for the warmup ramp and failure bookkeeping.

use crate::test_helpers::{MockConnector, test_pool};
use proptest::prelude::*;
use std::time::Duration;
use triadstore::core::pool::PoolConfig;
use triadstore::core::pool::warmup::{
    WARMUP_MAX, WARMUP_MIN, chunk_ms, connection_cap, step_for_elapsed,
};

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_step_is_clamped(elapsed in any::<u64>(), total in any::<u64>()) {
        let step = step_for_elapsed(elapsed, chunk_ms(total));
        prop_assert!((0..=WARMUP_MAX).contains(&step));
    }

    #[test]
    fn test_step_grows_with_elapsed(a in 0u64..100_000, b in 0u64..100_000, total in 1u64..100_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let chunk = chunk_ms(total);
        prop_assert!(step_for_elapsed(lo, chunk) <= step_for_elapsed(hi, chunk));
    }

    #[test]
    fn test_connection_cap_is_monotonic(level in WARMUP_MIN..WARMUP_MAX) {
        let here = connection_cap(level).unwrap();
        match connection_cap(level + 1) {
            Some(next) => prop_assert!(here <= next),
            None => prop_assert_eq!(level + 1, WARMUP_MAX),
        }
    }

    #[test]
    fn test_failures_keep_level_and_window_bounded(
        gaps in prop::collection::vec(1u64..5_000, 1..40),
        connect_failures in prop::collection::vec(any::<bool>(), 40)
    ) {
        let config = PoolConfig {
            fail_recover_time: Duration::from_secs(15),
            warmup_time: Duration::ZERO,
            ..PoolConfig::default()
        };
        let connector = MockConnector::new();
        let pool = test_pool(config, &connector);

        let mut time = 1_000_000u64;
        for (gap, is_connect) in gaps.iter().zip(&connect_failures) {
            time += gap;
            if *is_connect {
                pool.fail_connect_at(time);
            } else {
                pool.fail_socket_at(time);
            }
            prop_assert!(pool.warmup_level() >= WARMUP_MIN);
            prop_assert!(pool.warmup_level() <= 0);
            prop_assert!(pool.dynamic_fail_recover_ms() <= 15_000);
        }
    }
}
