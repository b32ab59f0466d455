use lumen::LumenError;
use lumen::config::{CircuitBreakerSettings, RetrySettings};
use lumen::core::resilience::{CircuitState, StoreResilience};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

fn fast_retry(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 2,
        backoff_multiplier: 2.0,
        jitter: false,
    }
}

fn breaker(failure_threshold: u32) -> CircuitBreakerSettings {
    CircuitBreakerSettings {
        failure_threshold,
        success_threshold: 2,
        timeout_secs: 60,
    }
}

fn transient_error() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::IoError, "connection reset"))
}

fn permanent_error() -> redis::RedisError {
    redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"))
}

#[tokio::test]
async fn test_execute_returns_value_on_success() {
    let resilience = StoreResilience::new(breaker(5), fast_retry(3));
    let result: Result<i32, _> = resilience.execute("op", None, || async { Ok(42) }).await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(resilience.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_transient_error_retried_until_success() {
    let resilience = StoreResilience::new(breaker(5), fast_retry(3));
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in_op = Arc::clone(&calls);
    let result = resilience
        .execute("op", None, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(transient_error())
                } else {
                    Ok("recovered")
                }
            }
        })
        .await;

    assert_eq!(result.unwrap(), "recovered");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_transient_error_surfaces_after_attempts_exhausted() {
    let resilience = StoreResilience::new(breaker(10), fast_retry(3));
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in_op = Arc::clone(&calls);
    let result: Result<(), _> = resilience
        .execute("op", None, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient_error())
            }
        })
        .await;

    assert!(matches!(result, Err(LumenError::Store(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_non_transient_error_fails_immediately() {
    let resilience = StoreResilience::new(breaker(10), fast_retry(3));
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in_op = Arc::clone(&calls);
    let result: Result<(), _> = resilience
        .execute("op", None, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(permanent_error())
            }
        })
        .await;

    assert!(matches!(result, Err(LumenError::Store(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1, "non-transient must not retry");
}

#[tokio::test]
async fn test_breaker_trips_then_fails_fast() {
    // Threshold 5, one attempt per call: five failing calls open the circuit.
    let resilience = StoreResilience::new(breaker(5), fast_retry(1));
    for _ in 0..5 {
        let _: Result<(), _> = resilience
            .execute("op", None, || async { Err(transient_error()) })
            .await;
    }
    assert_eq!(resilience.breaker().state(), CircuitState::Open);

    // The next call is rejected without invoking the operation.
    let calls = Arc::new(AtomicU32::new(0));
    let calls_in_op = Arc::clone(&calls);
    let result: Result<(), _> = resilience
        .execute("op", None, move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

    assert!(matches!(result, Err(LumenError::CircuitBreakerOpen(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_max_attempts_override() {
    let resilience = StoreResilience::new(breaker(100), fast_retry(5));
    let calls = Arc::new(AtomicU32::new(0));

    let calls_in_op = Arc::clone(&calls);
    let _: Result<(), _> = resilience
        .execute("op", Some(2), move || {
            let calls = Arc::clone(&calls_in_op);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(transient_error())
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
