//! Property tests for reconnect backoff

use fleetmon_core::session::{RetryConfig, RetryState};
use proptest::prelude::*;

/// Strategy for generating valid retry configurations
fn retry_config_strategy() -> impl Strategy<Value = RetryConfig> {
    (
        prop::option::of(0u32..10), // max_attempts, None = unlimited
        100u64..10_000,             // initial_delay_ms
        1_000u64..120_000,          // max_delay_ms
        1.0f64..5.0,                // backoff_multiplier
        any::<bool>(),              // enabled
    )
        .prop_map(
            |(max_attempts, initial_delay_ms, max_delay_ms, backoff_multiplier, enabled)| {
                RetryConfig::new()
                    .with_max_attempts(max_attempts)
                    .with_initial_delay_ms(initial_delay_ms)
                    .with_max_delay_ms(max_delay_ms.max(initial_delay_ms))
                    .with_backoff_multiplier(backoff_multiplier)
                    .with_enabled(enabled)
            },
        )
}

proptest! {
    /// Property: Delay is always capped at max_delay_ms
    #[test]
    fn delay_never_exceeds_max(
        config in retry_config_strategy(),
        attempt in 0u32..200,
    ) {
        if let Some(delay) = config.delay_for_attempt(attempt) {
            prop_assert!(delay.as_millis() <= u128::from(config.max_delay_ms));
        }
    }

    /// Property: Delays never shrink from one attempt to the next
    #[test]
    fn delays_are_non_decreasing(config in retry_config_strategy()) {
        let delays: Vec<_> = (0..12).map_while(|a| config.delay_for_attempt(a)).collect();
        prop_assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        if let Some(first) = delays.first() {
            prop_assert_eq!(first.as_millis(), u128::from(config.initial_delay_ms));
        }
    }

    /// Property: A bounded budget allows exactly max_attempts retries
    #[test]
    fn bounded_budget_is_exact(max in 0u32..20) {
        let config = RetryConfig::new().with_max_attempts(Some(max));
        let mut state = RetryState::new(config);

        let mut retries = 0;
        while state.next_delay().is_some() {
            retries += 1;
            state.record_failure("unreachable");
        }
        prop_assert_eq!(retries, max);
        prop_assert!(!state.should_retry());
        prop_assert_eq!(state.last_error(), (max > 0).then_some("unreachable"));
    }

    /// Property: Unlimited retries never run out, disabled retries never start
    #[test]
    fn unlimited_and_disabled(attempt in 0u32..u32::MAX) {
        prop_assert!(RetryConfig::unlimited().delay_for_attempt(attempt).is_some());
        prop_assert!(RetryConfig::no_retry().delay_for_attempt(attempt).is_none());
        prop_assert!(
            RetryConfig::unlimited()
                .with_enabled(false)
                .delay_for_attempt(attempt)
                .is_none()
        );
    }

    /// Property: Configurations survive a trip through the config file format
    #[test]
    fn toml_preserves_config(config in retry_config_strategy()) {
        let text = toml::to_string(&config).unwrap();
        let parsed: RetryConfig = toml::from_str(&text).unwrap();
        prop_assert_eq!(parsed.max_attempts, config.max_attempts);
        prop_assert_eq!(parsed.initial_delay_ms, config.initial_delay_ms);
        prop_assert_eq!(parsed.max_delay_ms, config.max_delay_ms);
        prop_assert_eq!(parsed.enabled, config.enabled);
    }
}
