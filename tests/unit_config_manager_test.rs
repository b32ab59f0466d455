use lumen::core::config::ConfigManager;
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, name: &str, contents: &str) {
    fs::write(dir.path().join(name), contents).unwrap();
}

fn manager_with(files: &[(&str, &str)]) -> (ConfigManager, TempDir) {
    let dir = TempDir::new().unwrap();
    for (name, contents) in files {
        write_config(&dir, name, contents);
    }
    let manager = ConfigManager::new(dir.path().to_path_buf(), 300);
    manager.initialize_defaults_only().unwrap();
    (manager, dir)
}

#[tokio::test]
async fn test_yaml_files_load_into_cache() {
    let (manager, _dir) = manager_with(&[(
        "game.yaml",
        "fusion_costs:\n  base: 1000\n  multiplier: 1.5\n",
    )]);

    assert_eq!(manager.get("fusion_costs.base"), Some(json!(1000)));
    assert_eq!(manager.get("fusion_costs.multiplier"), Some(json!(1.5)));
}

#[tokio::test]
async fn test_later_files_override_earlier_at_top_level() {
    let (manager, _dir) = manager_with(&[
        ("a.yaml", "drop_system:\n  regen_minutes: 5\n"),
        ("b.yaml", "drop_system:\n  regen_minutes: 10\n"),
    ]);

    assert_eq!(manager.get_i64("drop_system.regen_minutes", 0), 10);
}

#[tokio::test]
async fn test_nested_directories_are_loaded() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("balance")).unwrap();
    fs::write(
        dir.path().join("balance/shrine.yml"),
        "shrine:\n  yield: 25\n",
    )
    .unwrap();

    let manager = ConfigManager::new(dir.path().to_path_buf(), 300);
    manager.initialize_defaults_only().unwrap();

    assert_eq!(manager.get_i64("shrine.yield", 0), 25);
}

#[tokio::test]
async fn test_missing_path_falls_back_to_caller_default() {
    let (manager, _dir) = manager_with(&[("game.yaml", "fusion_costs:\n  base: 1000\n")]);

    assert_eq!(manager.get("fusion_costs.unknown"), None);
    assert_eq!(manager.get_i64("fusion_costs.unknown", 7), 7);
    assert_eq!(manager.get_i64("entirely.missing", 42), 42);
}

#[tokio::test]
async fn test_traversal_across_scalar_returns_default() {
    let (manager, _dir) = manager_with(&[("game.yaml", "fusion_costs:\n  base: 1000\n")]);
    // `base` is a scalar; descending further must miss, not error.
    assert_eq!(manager.get_i64("fusion_costs.base.deeper", 3), 3);
}

#[tokio::test]
async fn test_typed_getters() {
    let (manager, _dir) = manager_with(&[(
        "types.yaml",
        "flags:\n  enabled: true\n  label: hello\n  ratio: 0.25\n",
    )]);

    assert!(manager.get_bool("flags.enabled", false));
    assert_eq!(manager.get_str("flags.label", "x"), "hello");
    assert!((manager.get_f64("flags.ratio", 0.0) - 0.25).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_missing_config_dir_is_not_fatal() {
    let manager = ConfigManager::new("definitely-not-a-real-directory", 300);
    assert_eq!(manager.initialize_defaults_only().unwrap(), 0);
    assert_eq!(manager.get_i64("anything.at_all", 9), 9);
}

#[tokio::test]
async fn test_all_keys_lists_top_level() {
    let (manager, _dir) = manager_with(&[(
        "game.yaml",
        "fusion_costs:\n  base: 1\ndrop_system:\n  regen_minutes: 5\n",
    )]);
    let mut keys = manager.all_keys();
    keys.sort();
    assert_eq!(keys, vec!["drop_system", "fusion_costs"]);
}

#[tokio::test]
async fn test_metrics_track_hits_and_fallbacks() {
    let (manager, _dir) = manager_with(&[("game.yaml", "fusion_costs:\n  base: 1000\n")]);

    manager.get("fusion_costs.base");
    manager.get("missing.key");

    let summary = manager.metrics().summary();
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(summary.cache_misses, 1);
    assert_eq!(summary.gets, 2);
}

#[tokio::test]
async fn test_health_requires_refresh_task() {
    let (manager, _dir) = manager_with(&[("game.yaml", "fusion_costs:\n  base: 1\n")]);

    let health = manager.health();
    assert!(health.initialized);
    assert!(!health.refresh_task_running);
    assert!(!health.healthy);

    manager.set_refresh_running(true);
    assert!(manager.health().healthy);
}
