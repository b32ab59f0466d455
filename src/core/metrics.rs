// src/core/metrics.rs

//! Defines and registers Prometheus metrics for backend monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle. Subsystems also keep
//! their own in-memory counter sets for health predicates; the gauges and
//! counters here are the externally scraped view.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramVec, TextEncoder, register_counter,
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_histogram_vec,
};

lazy_static! {
    // --- Store operations ---
    /// The total number of in-memory-store operations, labeled by operation and outcome.
    pub static ref STORE_OPERATIONS_TOTAL: CounterVec =
        register_counter_vec!("lumen_store_operations_total", "Total in-memory store operations.", &["operation", "status"]).unwrap();
    /// A histogram of in-memory-store operation latencies, labeled by operation.
    pub static ref STORE_OPERATION_LATENCY_SECONDS: HistogramVec =
        register_histogram_vec!("lumen_store_operation_latency_seconds", "Latency of in-memory store operations in seconds.", &["operation"]).unwrap();
    /// The health state of the in-memory store (0 healthy, 1 degraded, 2 unhealthy).
    pub static ref STORE_HEALTH_STATE: Gauge =
        register_gauge!("lumen_store_health_state", "In-memory store health state (0 healthy, 1 degraded, 2 unhealthy).").unwrap();

    // --- Distributed locks ---
    /// The total number of distributed locks acquired.
    pub static ref LOCKS_ACQUIRED_TOTAL: Counter =
        register_counter!("lumen_locks_acquired_total", "Total distributed locks acquired.").unwrap();
    /// The total number of lock acquisitions that timed out.
    pub static ref LOCK_TIMEOUTS_TOTAL: Counter =
        register_counter!("lumen_lock_timeouts_total", "Total distributed lock acquisition timeouts.").unwrap();
    /// A histogram of time spent waiting to acquire distributed locks.
    pub static ref LOCK_WAIT_SECONDS: Histogram =
        register_histogram!("lumen_lock_wait_seconds", "Time spent waiting for distributed lock acquisition in seconds.").unwrap();
    /// A histogram of distributed lock hold durations.
    pub static ref LOCK_HOLD_SECONDS: Histogram =
        register_histogram!("lumen_lock_hold_seconds", "Distributed lock hold duration in seconds.").unwrap();

    // --- Circuit breakers ---
    /// The state of each circuit breaker (0 closed, 1 half-open, 2 open).
    pub static ref CIRCUIT_STATE: GaugeVec =
        register_gauge_vec!("lumen_circuit_state", "Circuit breaker state (0 closed, 1 half-open, 2 open).", &["breaker"]).unwrap();

    // --- Cache ---
    /// The total number of cache hits, labeled by cache kind.
    pub static ref CACHE_HITS_TOTAL: CounterVec =
        register_counter_vec!("lumen_cache_hits_total", "Total cache hits, labeled by cache kind.", &["cache"]).unwrap();
    /// The total number of cache misses, labeled by cache kind.
    pub static ref CACHE_MISSES_TOTAL: CounterVec =
        register_counter_vec!("lumen_cache_misses_total", "Total cache misses, labeled by cache kind.", &["cache"]).unwrap();
    /// The total number of cache entries invalidated.
    pub static ref CACHE_INVALIDATIONS_TOTAL: Counter =
        register_counter!("lumen_cache_invalidations_total", "Total cache entries invalidated.").unwrap();

    // --- Dynamic config ---
    /// The total number of background refreshes of the dynamic config.
    pub static ref CONFIG_REFRESHES_TOTAL: Counter =
        register_counter!("lumen_config_refreshes_total", "Total dynamic config background refreshes.").unwrap();

    // --- Event bus & audit ---
    /// The total number of events published, labeled by topic.
    pub static ref EVENTS_PUBLISHED_TOTAL: CounterVec =
        register_counter_vec!("lumen_events_published_total", "Total events published, labeled by topic.", &["topic"]).unwrap();
    /// The total number of subscriber handler failures during dispatch.
    pub static ref EVENT_HANDLER_FAILURES_TOTAL: Counter =
        register_counter!("lumen_event_handler_failures_total", "Total event subscriber handler failures.").unwrap();
    /// The total number of audit events emitted.
    pub static ref AUDIT_EVENTS_TOTAL: Counter =
        register_counter!("lumen_audit_events_total", "Total audit events emitted.").unwrap();
    /// The total number of audit payloads rejected by validation.
    pub static ref AUDIT_VALIDATION_FAILURES_TOTAL: Counter =
        register_counter!("lumen_audit_validation_failures_total", "Total audit payloads rejected by validation.").unwrap();

    // --- Rate limiting ---
    /// The total number of requests denied by the rate limiter.
    pub static ref RATE_LIMIT_DENIED_TOTAL: Counter =
        register_counter!("lumen_rate_limit_denied_total", "Total requests denied by the rate limiter.").unwrap();

    // --- Database ---
    /// The total number of database operations, labeled by outcome.
    pub static ref DB_OPERATIONS_TOTAL: CounterVec =
        register_counter_vec!("lumen_db_operations_total", "Total database operations, labeled by outcome.", &["status"]).unwrap();
    /// A histogram of database operation latencies.
    pub static ref DB_OPERATION_LATENCY_SECONDS: Histogram =
        register_histogram!("lumen_db_operation_latency_seconds", "Latency of database operations in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap()
}
