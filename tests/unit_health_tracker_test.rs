use lumen::core::store::health::{HealthState, HealthTracker, percentile};

#[test]
fn test_percentile_nearest_rank() {
    let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
    assert_eq!(percentile(&sorted, 0.50), 5.0);
    assert_eq!(percentile(&sorted, 0.95), 10.0);
    assert_eq!(percentile(&sorted, 0.99), 10.0);
    assert_eq!(percentile(&[], 0.95), 0.0);
    assert_eq!(percentile(&[42.0], 0.5), 42.0);
}

#[tokio::test]
async fn test_starts_healthy() {
    let tracker = HealthTracker::new(50);
    assert_eq!(tracker.state(), HealthState::Healthy);
}

#[tokio::test]
async fn test_single_failure_degrades() {
    let tracker = HealthTracker::new(50);
    tracker.record_check(true, 5.0);
    tracker.record_check(false, 5.0);
    assert_eq!(tracker.state(), HealthState::Degraded);
}

#[tokio::test]
async fn test_two_consecutive_failures_unhealthy() {
    let tracker = HealthTracker::new(50);
    tracker.record_check(false, 5.0);
    tracker.record_check(false, 5.0);
    assert_eq!(tracker.state(), HealthState::Unhealthy);
}

#[tokio::test]
async fn test_recovery_after_success() {
    let tracker = HealthTracker::new(50);
    tracker.record_check(false, 5.0);
    tracker.record_check(false, 5.0);
    assert_eq!(tracker.state(), HealthState::Unhealthy);

    tracker.record_check(true, 5.0);
    assert_eq!(tracker.state(), HealthState::Healthy);
}

#[tokio::test]
async fn test_slow_p95_degrades() {
    let tracker = HealthTracker::new(50);
    // Nineteen fast checks, then a burst of slow ones pushes p95 past the
    // warning threshold.
    for _ in 0..19 {
        tracker.record_check(true, 5.0);
    }
    assert_eq!(tracker.state(), HealthState::Healthy);
    for _ in 0..5 {
        tracker.record_check(true, 500.0);
    }
    assert_eq!(tracker.state(), HealthState::Degraded);
}

#[tokio::test]
async fn test_snapshot_reports_window_stats() {
    let tracker = HealthTracker::new(50);
    tracker.record_check(true, 10.0);
    tracker.record_check(true, 20.0);
    tracker.record_check(false, 100.0);

    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.checks_recorded, 3);
    assert_eq!(snapshot.consecutive_failures, 1);
    assert!((snapshot.error_rate - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(snapshot.latency_p50_ms, 10.0);
}

#[tokio::test]
async fn test_interleaved_failures_do_not_reach_unhealthy() {
    let tracker = HealthTracker::new(50);
    for _ in 0..5 {
        tracker.record_check(false, 5.0);
        tracker.record_check(true, 5.0);
    }
    // Never two failures in a row.
    assert_ne!(tracker.state(), HealthState::Unhealthy);
}
