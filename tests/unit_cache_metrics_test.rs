use lumen::core::cache::CacheMetrics;
use std::time::Duration;

#[test]
fn test_hit_rate_computation() {
    let metrics = CacheMetrics::new();
    for _ in 0..7 {
        metrics.record_hit(Duration::from_micros(100));
    }
    for _ in 0..3 {
        metrics.record_miss(Duration::from_micros(100));
    }
    assert!((metrics.hit_rate() - 0.7).abs() < 1e-9);
}

#[test]
fn test_hit_rate_zero_without_traffic() {
    let metrics = CacheMetrics::new();
    assert_eq!(metrics.hit_rate(), 0.0);
}

#[test]
fn test_health_passes_with_low_traffic() {
    // A fresh process has no lookups; it must not report unhealthy just
    // because the hit rate is still zero.
    let metrics = CacheMetrics::new();
    assert!(metrics.is_healthy(100, 0.5));
    metrics.record_miss(Duration::from_micros(10));
    assert!(metrics.is_healthy(100, 0.5));
}

#[test]
fn test_health_fails_on_error_budget() {
    let metrics = CacheMetrics::new();
    for _ in 0..100 {
        metrics.record_error();
    }
    assert!(!metrics.is_healthy(100, 0.0));
}

#[test]
fn test_health_fails_on_hit_rate_floor() {
    let metrics = CacheMetrics::new();
    for _ in 0..2 {
        metrics.record_hit(Duration::from_micros(10));
    }
    for _ in 0..18 {
        metrics.record_miss(Duration::from_micros(10));
    }
    assert!(!metrics.is_healthy(100, 0.5));
    assert!(metrics.is_healthy(100, 0.1));
}

#[test]
fn test_summary_and_reset() {
    let metrics = CacheMetrics::new();
    metrics.record_hit(Duration::from_millis(1));
    metrics.record_miss(Duration::from_millis(3));
    metrics.record_set(Duration::from_millis(2));
    metrics.record_invalidations(4);
    metrics.record_error();

    let summary = metrics.summary();
    assert_eq!(summary.hits, 1);
    assert_eq!(summary.misses, 1);
    assert_eq!(summary.sets, 1);
    assert_eq!(summary.invalidations, 4);
    assert_eq!(summary.errors, 1);
    assert!((summary.avg_get_time_ms - 2.0).abs() < 0.01);
    assert!((summary.avg_set_time_ms - 2.0).abs() < 0.01);

    metrics.reset();
    let summary = metrics.summary();
    assert_eq!(summary.hits, 0);
    assert_eq!(summary.invalidations, 0);
}
