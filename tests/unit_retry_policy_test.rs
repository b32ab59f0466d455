use lumen::config::RetrySettings;
use lumen::core::resilience::RetryPolicy;
use std::time::Duration;

fn policy_without_jitter() -> RetryPolicy {
    RetryPolicy::new(RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 100,
        max_delay_ms: 2000,
        backoff_multiplier: 2.0,
        jitter: false,
    })
}

#[test]
fn test_exponential_backoff_without_jitter() {
    let policy = policy_without_jitter();
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.delay_for(2), Duration::from_millis(200));
    assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    assert_eq!(policy.delay_for(4), Duration::from_millis(800));
}

#[test]
fn test_delay_caps_at_max() {
    let policy = policy_without_jitter();
    assert_eq!(policy.delay_for(10), Duration::from_millis(2000));
    assert_eq!(policy.delay_for(30), Duration::from_millis(2000));
}

#[test]
fn test_jitter_stays_within_ten_percent() {
    let policy = RetryPolicy::new(RetrySettings {
        max_attempts: 3,
        initial_delay_ms: 1000,
        max_delay_ms: 10_000,
        backoff_multiplier: 2.0,
        jitter: true,
    });
    for _ in 0..200 {
        let delay = policy.delay_for(1).as_millis() as i64;
        assert!((900..=1100).contains(&delay), "delay {delay}ms outside jitter band");
    }
}

#[test]
fn test_first_attempt_uses_initial_delay() {
    let policy = policy_without_jitter();
    assert_eq!(policy.delay_for(1), Duration::from_millis(100));
    assert_eq!(policy.max_attempts(), 3);
}
