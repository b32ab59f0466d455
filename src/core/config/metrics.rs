// src/core/config/metrics.rs

//! Thread-safe counters for dynamic configuration access.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Error budget before the config manager reports itself unhealthy.
const MAX_ERRORS_BEFORE_UNHEALTHY: u64 = 10;

/// Counter set for the dynamic config manager.
#[derive(Debug, Default)]
pub struct ConfigMetrics {
    gets: AtomicU64,
    sets: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fallbacks_to_defaults: AtomicU64,
    refreshes: AtomicU64,
    errors: AtomicU64,
    stale_reads: AtomicU64,
    total_get_time_us: AtomicU64,
    total_set_time_us: AtomicU64,
}

/// Derived snapshot of config-manager metrics.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigMetricsSummary {
    pub gets: u64,
    pub sets: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_hit_rate: f64,
    pub fallbacks_to_defaults: u64,
    pub refreshes: u64,
    pub errors: u64,
    pub stale_reads: u64,
    pub stale_read_rate: f64,
    pub avg_get_time_ms: f64,
    pub avg_set_time_ms: f64,
}

/// Health snapshot combining metrics with manager state.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigHealth {
    pub healthy: bool,
    pub initialized: bool,
    pub refresh_task_running: bool,
    pub cached_configs: usize,
    pub errors: u64,
}

impl ConfigMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self, elapsed: Duration) {
        self.gets.fetch_add(1, Ordering::Relaxed);
        self.total_get_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_set(&self, elapsed: Duration) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        self.total_set_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fallback(&self) {
        self.fallbacks_to_defaults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale_read(&self) {
        self.stale_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn within_error_budget(&self) -> bool {
        self.errors() < MAX_ERRORS_BEFORE_UNHEALTHY
    }

    pub fn summary(&self) -> ConfigMetricsSummary {
        let gets = self.gets.load(Ordering::Relaxed);
        let sets = self.sets.load(Ordering::Relaxed);
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let stale = self.stale_reads.load(Ordering::Relaxed);
        let lookups = hits + misses;

        ConfigMetricsSummary {
            gets,
            sets,
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
            fallbacks_to_defaults: self.fallbacks_to_defaults.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            stale_reads: stale,
            stale_read_rate: if gets > 0 {
                stale as f64 / gets as f64
            } else {
                0.0
            },
            avg_get_time_ms: if gets > 0 {
                self.total_get_time_us.load(Ordering::Relaxed) as f64 / gets as f64 / 1000.0
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
}
