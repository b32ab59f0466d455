// src/core/cache/metrics.rs

//! Process-wide cache counters with derived rates and the health predicate.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lookups required before the hit-rate health check applies; a freshly
/// started process with an empty window is not unhealthy.
const HIT_RATE_MIN_SAMPLES: u64 = 10;

/// Thread-safe counter set for the cache engine.
#[derive(Debug, Default)]
pub struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
    /// Reserved for large-payload compression.
    compressions: AtomicU64,
    total_get_time_us: AtomicU64,
    total_set_time_us: AtomicU64,
}

/// Derived snapshot for status endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetricsSummary {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub compressions: u64,
    pub hit_rate: f64,
    pub avg_get_time_ms: f64,
    pub avg_set_time_ms: f64,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self, elapsed: Duration) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.total_get_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_miss(&self, elapsed: Duration) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.total_get_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_set(&self, elapsed: Duration) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.total_set_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalidations(&self, count: u64) {
        self.invalidations.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let lookups = hits + self.misses.load(Ordering::Relaxed);
        if lookups > 0 {
            hits as f64 / lookups as f64
        } else {
            0.0
        }
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Health predicate: the error budget holds and, once there is enough
    /// traffic to judge, the hit rate clears the floor.
    pub fn is_healthy(&self, max_errors: u64, min_hit_rate: f64) -> bool {
        if self.errors() >= max_errors {
            return false;
        }
        let lookups = self.hits.load(Ordering::Relaxed) + self.misses.load(Ordering::Relaxed);
        lookups < HIT_RATE_MIN_SAMPLES || self.hit_rate() >= min_hit_rate
    }

    pub fn summary(&self) -> CacheMetricsSummary {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let sets = self.sets.load(Ordering::Relaxed);
        let lookups = hits + misses;

        CacheMetricsSummary {
            hits,
            misses,
            sets,
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            compressions: self.compressions.load(Ordering::Relaxed),
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            avg_get_time_ms: if lookups > 0 {
                self.total_get_time_us.load(Ordering::Relaxed) as f64 / lookups as f64 / 1000.0
            } else {
                0.0
            },
            avg_set_time_ms: if sets > 0 {
                self.total_set_time_us.load(Ordering::Relaxed) as f64 / sets as f64 / 1000.0
            } else {
                0.0
            },
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
        self.compressions.store(0, Ordering::Relaxed);
        self.total_get_time_us.store(0, Ordering::Relaxed);
        self.total_set_time_us.store(0, Ordering::Relaxed);
    }
}
