// src/core/resilience.rs

//! Unified resilience layer for the in-memory store: a three-state circuit
//! breaker combined with retry-with-backoff behind a single execution entry
//! point. The database service reuses the same `CircuitBreaker` with its own
//! thresholds.
//!
//! The breaker is consulted before any attempt; failures during retries feed
//! back into it; successes reset it. Breaker bookkeeping never panics into
//! the caller.

use crate::config::{CircuitBreakerSettings, RetrySettings};
use crate::core::errors::{LumenError, is_transient_redis_error};
use crate::core::metrics;
use parking_lot::Mutex;
use rand::Rng;
use std::future::Future;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tracing::{debug, error, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Failing, reject requests.
    Open,
    /// Testing recovery.
    HalfOpen,
}

impl CircuitState {
    fn gauge_value(self) -> f64 {
        match self {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<Instant>,
    last_failure_at: Option<Instant>,
}

/// A point-in-time view of breaker state for status endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitSnapshot {
    pub state: String,
    pub failure_count: u32,
    pub success_count: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_secs: u64,
    pub time_until_half_open_secs: Option<u64>,
}

/// Three-state circuit breaker.
///
/// Transitions:
/// - CLOSED → OPEN when consecutive failures reach `failure_threshold`.
/// - OPEN → HALF_OPEN after `timeout` has elapsed since opening.
/// - HALF_OPEN → CLOSED after `success_threshold` consecutive successes.
/// - HALF_OPEN → OPEN on any failure.
///
/// All state mutation happens under a single mutex; transitions are logged
/// with before/after states.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerSettings) -> Self {
        metrics::CIRCUIT_STATE
            .with_label_values(&[name])
            .set(CircuitState::Closed.gauge_value());
        Self {
            name: name.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
                last_failure_at: None,
            }),
        }
    }

    /// Checks whether an operation may proceed, moving OPEN → HALF_OPEN once
    /// the open timeout has elapsed.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let Some(opened_at) = inner.opened_at else {
                    warn!(breaker = %self.name, "circuit OPEN without opened_at, allowing operation");
                    return true;
                };
                if opened_at.elapsed() >= self.config.timeout() {
                    self.transition(&mut inner, CircuitState::HalfOpen);
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful operation.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.success_count += 1;
        inner.failure_count = 0;

        if inner.state == CircuitState::HalfOpen
            && inner.success_count >= self.config.success_threshold
        {
            self.transition(&mut inner, CircuitState::Closed);
            inner.failure_count = 0;
            inner.success_count = 0;
            inner.opened_at = None;
        }
    }

    /// Records a failed operation, opening the circuit when the threshold is
    /// reached or when probing in HALF_OPEN.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.failure_count += 1;
        inner.success_count = 0;
        inner.last_failure_at = Some(Instant::now());

        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, CircuitState::Open);
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                self.transition(&mut inner, CircuitState::Open);
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    /// Manually resets the breaker to CLOSED with zero counts.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.opened_at = None;
        inner.last_failure_at = None;
        metrics::CIRCUIT_STATE
            .with_label_values(&[&self.name])
            .set(CircuitState::Closed.gauge_value());
        info!(breaker = %self.name, previous = %previous, "circuit breaker manually reset");
    }

    /// Manually forces the breaker OPEN, e.g. for maintenance.
    pub fn force_open(&self) {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, CircuitState::Open);
        inner.opened_at = Some(Instant::now());
        warn!(breaker = %self.name, "circuit breaker manually forced OPEN");
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        let time_until_half_open_secs = match (inner.state, inner.opened_at) {
            (CircuitState::Open, Some(at)) => Some(
                self.config
                    .timeout()
                    .saturating_sub(at.elapsed())
                    .as_secs(),
            ),
            _ => None,
        };
        CircuitSnapshot {
            state: inner.state.to_string(),
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            failure_threshold: self.config.failure_threshold,
            success_threshold: self.config.success_threshold,
            timeout_secs: self.config.timeout_secs,
            time_until_half_open_secs,
        }
    }

    fn transition(&self, inner: &mut BreakerInner, to: CircuitState) {
        let from = inner.state;
        inner.state = to;
        metrics::CIRCUIT_STATE
            .with_label_values(&[&self.name])
            .set(to.gauge_value());
        match to {
            CircuitState::Open => warn!(
                breaker = %self.name,
                from = %from,
                to = %to,
                failure_count = inner.failure_count,
                failure_threshold = self.config.failure_threshold,
                timeout_secs = self.config.timeout_secs,
                "circuit breaker transitioned"
            ),
            _ => info!(breaker = %self.name, from = %from, to = %to, "circuit breaker transitioned"),
        }
    }
}

/// Exponential-backoff retry policy with optional jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn max_attempts(&self) -> u32 {
        self.settings.max_attempts
    }

    /// Delay before the retry following `attempt` (1-indexed):
    /// `min(initial * multiplier^(attempt-1), max)` plus ±10% jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let initial = self.settings.initial_delay_ms as f64;
        let raw = initial * self.settings.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let mut delay_ms = raw.min(self.settings.max_delay_ms as f64);

        if self.settings.jitter {
            let jitter = delay_ms * 0.1;
            delay_ms += rand::thread_rng().gen_range(-jitter..=jitter);
        }

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }
}

/// Unified resilience layer for in-memory-store operations: the single entry
/// point that applies circuit breaking and retry to every store round-trip.
pub struct StoreResilience {
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl StoreResilience {
    pub fn new(circuit: CircuitBreakerSettings, retry: RetrySettings) -> Self {
        Self {
            breaker: CircuitBreaker::new("store", circuit),
            retry: RetryPolicy::new(retry),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Executes a store operation with circuit breaking and retry.
    ///
    /// The breaker is consulted before the first attempt; an OPEN circuit
    /// rejects with `CircuitBreakerOpen`. Transient errors (connection
    /// refused/reset, timeout, generic network) retry with exponential
    /// backoff up to `max_attempts` (defaulting to the configured policy);
    /// non-transient errors record a failure and surface immediately.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        max_attempts: Option<u32>,
        op: F,
    ) -> Result<T, LumenError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, redis::RedisError>>,
    {
        if !self.breaker.can_execute() {
            return Err(LumenError::CircuitBreakerOpen(operation_name.to_string()));
        }

        let attempts = max_attempts.unwrap_or(self.retry.max_attempts()).max(1);

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt, "store operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if is_transient_redis_error(&e) => {
                    self.breaker.record_failure();
                    if attempt >= attempts {
                        error!(
                            operation = operation_name,
                            attempts = attempt,
                            circuit_state = %self.breaker.state(),
                            error = %e,
                            "store operation failed after all retries"
                        );
                        return Err(e.into());
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        total_attempts = attempts,
                        retry_delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "store operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    error!(
                        operation = operation_name,
                        attempt,
                        circuit_state = %self.breaker.state(),
                        error = %e,
                        "store operation failed with non-retryable error"
                    );
                    return Err(e.into());
                }
            }
        }

        debug!(
            operation = operation_name,
            "retry loop exhausted without result"
        );
        Err(LumenError::Internal(format!(
            "store operation '{operation_name}' failed without an error"
        )))
    }
}
