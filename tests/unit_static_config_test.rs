use lumen::config::{Config, Environment, RateLimitAlgorithm};
use std::sync::Mutex;

// Environment variables are process-global; serialize the tests that touch
// them.
static ENV_GUARD: Mutex<()> = Mutex::new(());

fn clear_lumen_env() {
    for (key, _) in std::env::vars() {
        let owned: &[&str] = &[
            "LUMEN_ENV",
            "LOG_LEVEL",
            "CONFIG_DIR",
            "CONFIG_REFRESH_SECS",
            "REDIS_URL",
            "DATABASE_URL",
            "REDIS_MAX_CONNECTIONS",
            "LOCK_TIMEOUT_SECS",
            "LOCK_WAIT_TIMEOUT_SECS",
            "RATE_LIMIT_ALGORITHM",
            "RATE_LIMIT_DEFAULT_RATE",
            "CIRCUIT_FAILURE_THRESHOLD",
            "METRICS_PORT",
            "GRACE_MAX_CAP",
        ];
        if owned.contains(&key.as_str()) {
            unsafe { std::env::remove_var(&key) };
        }
    }
}

#[test]
fn test_defaults_outside_production() {
    let _guard = ENV_GUARD.lock().unwrap();
    clear_lumen_env();

    let config = Config::from_env().unwrap();
    assert_eq!(config.environment, Environment::Development);
    assert_eq!(config.log_level, "info");
    assert_eq!(config.redis.max_connections, 50);
    assert_eq!(config.redis.default_ttl_secs, 300);
    assert_eq!(config.lock.timeout_secs, 5);
    assert_eq!(config.lock.wait_timeout_secs, 5);
    assert_eq!(config.resilience.circuit.failure_threshold, 5);
    assert_eq!(config.resilience.retry.max_attempts, 3);
    assert_eq!(config.rate_limiter.algorithm, RateLimitAlgorithm::TokenBucket);
    assert_eq!(config.batch.max_keys_per_operation, 1000);
    assert_eq!(config.game.grace_max_cap, 999_999);
}

#[test]
fn test_env_overrides_apply() {
    let _guard = ENV_GUARD.lock().unwrap();
    clear_lumen_env();

    unsafe {
        std::env::set_var("LOG_LEVEL", "debug");
        std::env::set_var("REDIS_MAX_CONNECTIONS", "25");
        std::env::set_var("RATE_LIMIT_ALGORITHM", "fixed_window");
        std::env::set_var("GRACE_MAX_CAP", "500000");
    }

    let config = Config::from_env().unwrap();
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.redis.max_connections, 25);
    assert_eq!(config.rate_limiter.algorithm, RateLimitAlgorithm::FixedWindow);
    assert_eq!(config.game.grace_max_cap, 500_000);

    clear_lumen_env();
}

#[test]
fn test_unparseable_value_falls_back_to_default() {
    let _guard = ENV_GUARD.lock().unwrap();
    clear_lumen_env();

    unsafe { std::env::set_var("REDIS_MAX_CONNECTIONS", "lots") };
    let config = Config::from_env().unwrap();
    assert_eq!(config.redis.max_connections, 50);

    clear_lumen_env();
}

#[test]
fn test_production_requires_connection_urls() {
    let _guard = ENV_GUARD.lock().unwrap();
    clear_lumen_env();

    unsafe { std::env::set_var("LUMEN_ENV", "production") };
    let result = Config::from_env();
    assert!(result.is_err());

    unsafe {
        std::env::set_var("REDIS_URL", "redis://cache.internal:6379/0");
        std::env::set_var("DATABASE_URL", "postgres://app@db.internal/lumen");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.environment, Environment::Production);

    clear_lumen_env();
}

#[test]
fn test_reloadable_key_classification() {
    assert!(Config::is_reloadable("LOG_LEVEL"));
    assert!(Config::is_reloadable("RATE_LIMIT_DEFAULT_RATE"));
    assert!(Config::is_reloadable("GRACE_MAX_CAP"));
    assert!(!Config::is_reloadable("DATABASE_URL"));
    assert!(!Config::is_reloadable("DATABASE_POOL_SIZE"));
    assert!(!Config::is_reloadable("REDIS_URL"));
}
