//! Property tests for retry policy backoff over arbitrary in-bounds
//! configurations.

use std::time::Duration;

use proptest::prelude::*;

use assettrack_webhooks::retry::{RetryDecision, RetryPolicy};

fn arb_policy() -> impl Strategy<Value = RetryPolicy> {
    (1..=10i32, 1.0..=10.0f64, 100..=60_000i64, 1_000..=3_600_000i64).prop_map(
        |(max_attempts, backoff_multiplier, initial_delay_ms, max_delay_ms)| RetryPolicy {
            max_attempts,
            backoff_multiplier,
            initial_delay_ms,
            max_delay_ms,
        },
    )
}

proptest! {
    #[test]
    fn in_bounds_policies_validate(policy in arb_policy()) {
        prop_assert!(policy.validate().is_ok());
    }

    #[test]
    fn delays_never_exceed_max(policy in arb_policy(), attempt in 1..=10i32) {
        let delay = policy.delay_after_attempt(attempt);
        prop_assert!(delay <= Duration::from_millis(policy.max_delay_ms as u64));
    }

    #[test]
    fn first_delay_is_initial_delay(policy in arb_policy()) {
        let expected = policy.initial_delay_ms.min(policy.max_delay_ms) as u64;
        prop_assert_eq!(policy.delay_after_attempt(1), Duration::from_millis(expected));
    }

    #[test]
    fn delays_are_monotone_non_decreasing(policy in arb_policy()) {
        let mut previous = Duration::ZERO;
        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_after_attempt(attempt);
            prop_assert!(delay >= previous);
            previous = delay;
        }
    }

    #[test]
    fn decision_exhausts_exactly_at_budget(policy in arb_policy()) {
        for attempt in 1..policy.max_attempts {
            prop_assert!(matches!(policy.decide(attempt), RetryDecision::RetryAfter(_)));
        }
        prop_assert_eq!(policy.decide(policy.max_attempts), RetryDecision::Exhausted);
        prop_assert_eq!(policy.decide(policy.max_attempts + 1), RetryDecision::Exhausted);
    }

    #[test]
    fn serde_roundtrip_preserves_policy(policy in arb_policy()) {
        let json = serde_json::to_string(&policy).unwrap();
        let restored: RetryPolicy = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(policy, restored);
    }
}
