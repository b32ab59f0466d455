// src/core/store/metrics.rs

//! In-memory counter set for store operations and distributed locks.
//!
//! The Prometheus registry in `core::metrics` is the scraped view; this
//! per-process counter set backs the status API and health predicates.
//! Recording a metric must never fail into the caller.

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Default, Clone, Copy)]
struct OpStats {
    count: u64,
    failures: u64,
    total_latency_us: u64,
}

/// Per-operation summary exposed through the status API.
#[derive(Debug, Clone, Serialize)]
pub struct OperationSummary {
    pub count: u64,
    pub failures: u64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
}

/// Lock-related counters exposed through the status API.
#[derive(Debug, Clone, Serialize)]
pub struct LockSummary {
    pub acquired: u64,
    pub timeouts: u64,
    pub released: u64,
    pub expired_or_stolen: u64,
    pub avg_wait_ms: f64,
    pub avg_hold_ms: f64,
}

/// Complete store metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct StoreMetricsSummary {
    pub operations: BTreeMap<String, OperationSummary>,
    pub locks: LockSummary,
}

/// Thread-safe counters for store operations and locks.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    ops: DashMap<String, OpStats>,
    locks_acquired: AtomicU64,
    lock_timeouts: AtomicU64,
    locks_released: AtomicU64,
    locks_expired: AtomicU64,
    lock_wait_total_us: AtomicU64,
    lock_hold_total_us: AtomicU64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records latency and outcome for one store operation.
    pub fn record_operation(&self, operation: &str, latency: Duration, success: bool) {
        let mut entry = self.ops.entry(operation.to_string()).or_default();
        entry.count += 1;
        if !success {
            entry.failures += 1;
        }
        entry.total_latency_us += latency.as_micros() as u64;
    }

    pub fn record_lock_acquisition(&self, wait: Duration, success: bool) {
        if success {
            self.locks_acquired.fetch_add(1, Ordering::Relaxed);
        } else {
            self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
        }
        self.lock_wait_total_us
            .fetch_add(wait.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_lock_release(&self, hold: Duration, owned: bool) {
        if owned {
            self.locks_released.fetch_add(1, Ordering::Relaxed);
        } else {
            self.locks_expired.fetch_add(1, Ordering::Relaxed);
        }
        self.lock_hold_total_us
            .fetch_add(hold.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn summary(&self) -> StoreMetricsSummary {
        let mut operations = BTreeMap::new();
        for entry in self.ops.iter() {
            let s = *entry.value();
            let error_rate = if s.count > 0 {
                s.failures as f64 / s.count as f64
            } else {
                0.0
            };
            let avg_latency_ms = if s.count > 0 {
                s.total_latency_us as f64 / s.count as f64 / 1000.0
            } else {
                0.0
            };
            operations.insert(
                entry.key().clone(),
                OperationSummary {
                    count: s.count,
                    failures: s.failures,
                    error_rate,
                    avg_latency_ms,
                },
            );
        }

        let acquired = self.locks_acquired.load(Ordering::Relaxed);
        let timeouts = self.lock_timeouts.load(Ordering::Relaxed);
        let released = self.locks_released.load(Ordering::Relaxed);
        let expired = self.locks_expired.load(Ordering::Relaxed);
        let wait_samples = acquired + timeouts;
        let hold_samples = released + expired;

        StoreMetricsSummary {
            operations,
            locks: LockSummary {
                acquired,
                timeouts,
                released,
                expired_or_stolen: expired,
                avg_wait_ms: if wait_samples > 0 {
                    self.lock_wait_total_us.load(Ordering::Relaxed) as f64
                        / wait_samples as f64
                        / 1000.0
                } else {
                    0.0
                },
                avg_hold_ms: if hold_samples > 0 {
                    self.lock_hold_total_us.load(Ordering::Relaxed) as f64
                        / hold_samples as f64
                        / 1000.0
                } else {
                    0.0
                },
            },
        }
    }
}
