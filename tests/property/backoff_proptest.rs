//! Property-based tests for the reconnection and retry backoff

use community_sync::client::offline::BackoffStrategy;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

fn exponential(base_ms: u64, cap_ms: u64, jitter_ms: u64) -> BackoffStrategy {
    BackoffStrategy::Exponential {
        base: Duration::from_millis(base_ms),
        max: Duration::from_millis(cap_ms),
        jitter: Duration::from_millis(jitter_ms),
    }
}

proptest! {
    #[test]
    fn test_exponential_delay_is_monotonic_and_capped(
        base_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
        attempt in 1u32..64,
    ) {
        let cap_ms = base_ms + extra_ms;
        let backoff = exponential(base_ms, cap_ms, 0);

        let current = backoff.base_delay(attempt);
        let next = backoff.base_delay(attempt + 1);
        prop_assert!(next >= current);
        prop_assert!(current <= Duration::from_millis(cap_ms));
        prop_assert!(current >= Duration::from_millis(base_ms));
    }

    #[test]
    fn test_jitter_stays_below_bound(
        seed in any::<u64>(),
        attempt in 1u32..32,
        jitter_ms in 1u64..2_000,
    ) {
        let backoff = exponential(1_000, 60_000, jitter_ms);
        let mut rng = StdRng::seed_from_u64(seed);

        let base = backoff.base_delay(attempt);
        let delay = backoff.delay_with(attempt, &mut rng);
        prop_assert!(delay >= base);
        prop_assert!(delay < base + Duration::from_millis(jitter_ms));
    }

    #[test]
    fn test_any_nonzero_jitter_is_sampled(
        seed in any::<u64>(),
        attempt in 1u32..32,
        jitter_ns in 1u64..2_000_000,
    ) {
        let backoff = BackoffStrategy::Exponential {
            base: Duration::from_millis(20),
            max: Duration::from_millis(200),
            jitter: Duration::from_nanos(jitter_ns),
        };
        let mut rng = StdRng::seed_from_u64(seed);

        let base = backoff.base_delay(attempt);
        let delay = backoff.delay_with(attempt, &mut rng);
        prop_assert!(delay >= base);
        prop_assert!(delay < base + Duration::from_nanos(jitter_ns));
    }

    #[test]
    fn test_linear_delay_grows_by_step(step_ms in 1u64..10_000, attempt in 1u32..100) {
        let backoff = BackoffStrategy::Linear { step: Duration::from_millis(step_ms) };
        prop_assert_eq!(
            backoff.base_delay(attempt + 1) - backoff.base_delay(attempt),
            Duration::from_millis(step_ms)
        );
    }
}
