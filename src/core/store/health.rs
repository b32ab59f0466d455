// src/core/store/health.rs

//! Continuous background health monitoring for the in-memory store.
//!
//! A periodic PING feeds a rolling window of results from which latency
//! percentiles and an error rate are derived. Two consecutive failures mean
//! UNHEALTHY; a p95 above the warning threshold means DEGRADED. State
//! transitions are logged and mirrored into the Prometheus gauge.

use crate::config::HealthSettings;
use crate::core::metrics as prom;
use crate::core::store::StoreService;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Size of the rolling window of health-check results.
const CHECK_HISTORY_SIZE: usize = 100;

/// Consecutive failures required before the store is declared UNHEALTHY.
const UNHEALTHY_FAILURE_STREAK: u32 = 2;

/// In-memory store health states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "UPPERCASE")]
pub enum HealthState {
    /// All systems operational.
    Healthy,
    /// Operational but slow.
    Degraded,
    /// Not operational.
    Unhealthy,
}

impl HealthState {
    fn gauge_value(self) -> f64 {
        match self {
            HealthState::Healthy => 0.0,
            HealthState::Degraded => 1.0,
            HealthState::Unhealthy => 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CheckResult {
    passed: bool,
    latency_ms: f64,
}

#[derive(Debug)]
struct TrackerInner {
    state: HealthState,
    history: VecDeque<CheckResult>,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_check: Option<Instant>,
}

/// A queryable snapshot of store health for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub state: String,
    pub checks_recorded: usize,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub error_rate: f64,
    pub latency_p50_ms: f64,
    pub latency_p95_ms: f64,
    pub latency_p99_ms: f64,
    pub seconds_since_last_check: Option<u64>,
}

/// Nearest-rank percentile over an already sorted sample.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// The health state machine, separated from probing so the transition rules
/// stand on their own.
pub struct HealthTracker {
    latency_warning_ms: u64,
    inner: Mutex<TrackerInner>,
}

impl HealthTracker {
    pub fn new(latency_warning_ms: u64) -> Self {
        prom::STORE_HEALTH_STATE.set(HealthState::Healthy.gauge_value());
        Self {
            latency_warning_ms,
            inner: Mutex::new(TrackerInner {
                state: HealthState::Healthy,
                history: VecDeque::with_capacity(CHECK_HISTORY_SIZE),
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_check: None,
            }),
        }
    }

    /// Folds one check result into the window and recomputes the state.
    pub fn record_check(&self, passed: bool, latency_ms: f64) {
        let mut inner = self.inner.lock();
        if inner.history.len() == CHECK_HISTORY_SIZE {
            inner.history.pop_front();
        }
        inner.history.push_back(CheckResult { passed, latency_ms });
        inner.last_check = Some(Instant::now());

        if passed {
            inner.consecutive_successes += 1;
            inner.consecutive_failures = 0;
        } else {
            inner.consecutive_failures += 1;
            inner.consecutive_successes = 0;
        }

        let new_state = if inner.consecutive_failures >= UNHEALTHY_FAILURE_STREAK {
            HealthState::Unhealthy
        } else if inner.consecutive_failures > 0 {
            HealthState::Degraded
        } else {
            let mut passing: Vec<f64> = inner
                .history
                .iter()
                .filter(|c| c.passed)
                .map(|c| c.latency_ms)
                .collect();
            passing.sort_by(|a, b| a.total_cmp(b));
            if percentile(&passing, 0.95) > self.latency_warning_ms as f64 {
                HealthState::Degraded
            } else {
                HealthState::Healthy
            }
        };

        if new_state != inner.state {
            let old_state = inner.state;
            inner.state = new_state;
            prom::STORE_HEALTH_STATE.set(new_state.gauge_value());
            match new_state {
                HealthState::Healthy => info!(
                    from = %old_state,
                    to = %new_state,
                    "store health recovered"
                ),
                _ => warn!(
                    from = %old_state,
                    to = %new_state,
                    consecutive_failures = inner.consecutive_failures,
                    latency_ms,
                    "store health degraded"
                ),
            }
        }
    }

    pub fn state(&self) -> HealthState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let inner = self.inner.lock();
        let total = inner.history.len();
        let failures = inner.history.iter().filter(|c| !c.passed).count();
        let mut latencies: Vec<f64> = inner
            .history
            .iter()
            .filter(|c| c.passed)
            .map(|c| c.latency_ms)
            .collect();
        latencies.sort_by(|a, b| a.total_cmp(b));

        HealthSnapshot {
            state: inner.state.to_string(),
            checks_recorded: total,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            error_rate: if total > 0 {
                failures as f64 / total as f64
            } else {
                0.0
            },
            latency_p50_ms: percentile(&latencies, 0.50),
            latency_p95_ms: percentile(&latencies, 0.95),
            latency_p99_ms: percentile(&latencies, 0.99),
            seconds_since_last_check: inner.last_check.map(|t| t.elapsed().as_secs()),
        }
    }
}

/// Background health monitor: drives the tracker with periodic PINGs.
pub struct StoreHealthMonitor {
    store: Arc<StoreService>,
    settings: HealthSettings,
    tracker: HealthTracker,
}

impl StoreHealthMonitor {
    pub fn new(store: Arc<StoreService>, settings: HealthSettings) -> Self {
        Self {
            store,
            tracker: HealthTracker::new(settings.latency_warning_ms),
            settings,
        }
    }

    /// The main run loop: a PING on a timer until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            check_interval_secs = self.settings.check_interval_secs,
            latency_warning_ms = self.settings.latency_warning_ms,
            "store health monitor started"
        );
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.settings.check_interval_secs));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.perform_check().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("store health monitor shutting down");
                    return;
                }
            }
        }
    }

    /// Performs one health check and folds the result into the window.
    pub async fn perform_check(&self) {
        let timeout = Duration::from_secs(self.settings.timeout_secs);
        let start = Instant::now();
        let (passed, latency_ms) = match tokio::time::timeout(timeout, self.store.ping()).await {
            Ok(Ok(())) => (true, start.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(e)) => {
                warn!(error = %e, "store health check failed");
                (false, start.elapsed().as_secs_f64() * 1000.0)
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.settings.timeout_secs,
                    "store health check timed out"
                );
                (false, timeout.as_secs_f64() * 1000.0)
            }
        };
        self.tracker.record_check(passed, latency_ms);
    }

    pub fn state(&self) -> HealthState {
        self.tracker.state()
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.tracker.snapshot()
    }
}
