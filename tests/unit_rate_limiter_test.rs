use lumen::core::store::rate_limiter::window_index;

#[test]
fn test_window_index_advances_per_period() {
    assert_eq!(window_index(0, 60), 0);
    assert_eq!(window_index(59, 60), 0);
    assert_eq!(window_index(60, 60), 1);
    assert_eq!(window_index(3600, 60), 60);
}

#[test]
fn test_window_index_guards_zero_period() {
    // A zero period must not panic; it degrades to one-second windows.
    assert_eq!(window_index(5, 0), 5);
}

#[test]
fn test_adjacent_timestamps_share_a_window() {
    let a = window_index(1_700_000_000, 60);
    let b = window_index(1_700_000_030, 60);
    assert_eq!(a, b);
    let c = window_index(1_700_000_060, 60);
    assert_eq!(c, a + 1);
}
