// src/core/store/mod.rs

//! Typed async client for the external in-memory store.
//!
//! Every operation flows through the resilience layer (circuit breaker +
//! retry), is bounded by the configured socket timeout, and records latency
//! and outcome into both the in-memory counter set and the Prometheus
//! registry. The store is never authoritative: callers treat it as a
//! projection of relational state.

pub mod batch;
pub mod health;
pub mod json;
pub mod lock;
pub mod metrics;
pub mod rate_limiter;

use crate::config::{BatchSettings, Config, LockSettings};
use crate::core::errors::LumenError;
use crate::core::metrics as prom;
use crate::core::resilience::{CircuitSnapshot, StoreResilience};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

pub use health::{HealthSnapshot, HealthState, HealthTracker, StoreHealthMonitor};
pub use lock::{LockGuard, LockOptions, LockOwnerInfo};
pub use metrics::{StoreMetrics, StoreMetricsSummary};
pub use rate_limiter::RateLimiter;

/// Combined status snapshot for monitoring endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStatus {
    pub circuit: CircuitSnapshot,
    pub metrics: StoreMetricsSummary,
}

/// Production async client for the in-memory store: connection management,
/// resilience-wrapped KV/JSON/batch operations, distributed locking, and
/// rate limiting.
pub struct StoreService {
    manager: ConnectionManager,
    resilience: Arc<StoreResilience>,
    metrics: Arc<StoreMetrics>,
    rate_limiter: RateLimiter,
    op_timeout: Duration,
    default_ttl_secs: u64,
    lock_settings: LockSettings,
    batch_settings: BatchSettings,
}

impl StoreService {
    /// Connects to the store, verifies connectivity with a PING, and builds
    /// the resilience and metrics plumbing.
    pub async fn connect(config: &Config) -> Result<Self, LumenError> {
        let started = Instant::now();
        let client = redis::Client::open(config.redis.url.as_str())?;
        let mut manager = client.get_tokio_connection_manager().await?;

        // Verify the connection before handing the service out.
        redis::cmd("PING")
            .query_async::<_, String>(&mut manager)
            .await?;

        let resilience = Arc::new(StoreResilience::new(
            config.resilience.circuit,
            config.resilience.retry,
        ));
        let rate_limiter = RateLimiter::new(manager.clone(), config.rate_limiter);

        info!(
            max_connections = config.redis.max_connections,
            socket_timeout_secs = config.redis.socket_timeout_secs,
            default_ttl_secs = config.redis.default_ttl_secs,
            startup_ms = started.elapsed().as_millis() as u64,
            "store service connected"
        );

        Ok(Self {
            manager,
            resilience,
            metrics: Arc::new(StoreMetrics::new()),
            rate_limiter,
            op_timeout: Duration::from_secs(config.redis.socket_timeout_secs),
            default_ttl_secs: config.redis.default_ttl_secs,
            lock_settings: config.lock,
            batch_settings: config.batch,
        })
    }

    pub fn resilience(&self) -> &StoreResilience {
        &self.resilience
    }

    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    pub(crate) fn metrics_arc(&self) -> &Arc<StoreMetrics> {
        &self.metrics
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    pub(crate) fn connection(&self) -> ConnectionManager {
        self.manager.clone()
    }

    pub(crate) fn lock_settings(&self) -> LockSettings {
        self.lock_settings
    }

    pub(crate) fn batch_settings(&self) -> BatchSettings {
        self.batch_settings
    }

    pub fn status(&self) -> StoreStatus {
        StoreStatus {
            circuit: self.resilience.breaker().snapshot(),
            metrics: self.metrics.summary(),
        }
    }

    /// Runs one store operation through the resilience layer with the
    /// configured deadline, recording latency and outcome under `label`.
    pub(crate) async fn run<T, F, Fut>(
        &self,
        label: &'static str,
        operation_name: String,
        f: F,
    ) -> Result<T, LumenError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let start = Instant::now();
        let timeout = self.op_timeout;
        let result = self
            .resilience
            .execute(&operation_name, None, || {
                let fut = f();
                async move {
                    match tokio::time::timeout(timeout, fut).await {
                        Ok(r) => r,
                        Err(_) => Err(redis::RedisError::from((
                            redis::ErrorKind::IoError,
                            "store operation timed out",
                        ))),
                    }
                }
            })
            .await;

        let latency = start.elapsed();
        let success = result.is_ok();
        self.metrics.record_operation(label, latency, success);
        prom::STORE_OPERATIONS_TOTAL
            .with_label_values(&[label, if success { "ok" } else { "error" }])
            .inc();
        prom::STORE_OPERATION_LATENCY_SECONDS
            .with_label_values(&[label])
            .observe(latency.as_secs_f64());

        if let Err(e) = &result {
            error!(
                operation = %operation_name,
                latency_ms = latency.as_millis() as u64,
                error = %e,
                "store operation failed"
            );
        }
        result
    }

    // ------------------------------------------------------------------
    // Key-value operations
    // ------------------------------------------------------------------

    /// Gets a string value, or `None` when the key is absent.
    pub async fn get(&self, key: &str) -> Result<Option<String>, LumenError> {
        let result = self
            .run("GET", format!("GET:{key}"), || {
                let mut con = self.manager.clone();
                let key = key.to_string();
                async move { con.get::<_, Option<String>>(key).await }
            })
            .await?;
        debug!(key, found = result.is_some(), "store GET");
        Ok(result)
    }

    /// Sets a string value with a TTL (the configured default when `None`).
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl_secs: Option<u64>,
    ) -> Result<bool, LumenError> {
        let ttl = ttl_secs.unwrap_or(self.default_ttl_secs);
        self.run("SET", format!("SET:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            let value = value.to_string();
            async move { con.set_ex::<_, _, ()>(key, value, ttl as u64).await }
        })
        .await?;
        debug!(key, ttl_secs = ttl, "store SET");
        Ok(true)
    }

    /// Deletes a key, returning the number of keys removed.
    pub async fn delete(&self, key: &str) -> Result<u64, LumenError> {
        let count = self
            .run("DELETE", format!("DEL:{key}"), || {
                let mut con = self.manager.clone();
                let key = key.to_string();
                async move { con.del::<_, u64>(key).await }
            })
            .await?;
        debug!(key, deleted = count, "store DELETE");
        Ok(count)
    }

    /// Atomically increments an integer key, returning the new value.
    pub async fn incr(&self, key: &str, amount: i64) -> Result<i64, LumenError> {
        self.run("INCR", format!("INCR:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            async move { con.incr::<_, _, i64>(key, amount).await }
        })
        .await
    }

    /// Atomically decrements an integer key, returning the new value.
    pub async fn decr(&self, key: &str, amount: i64) -> Result<i64, LumenError> {
        self.run("DECR", format!("DECR:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            async move { con.decr::<_, _, i64>(key, amount).await }
        })
        .await
    }

    /// Sets an expiry on an existing key. Returns false when the key is absent.
    pub async fn expire(&self, key: &str, ttl_secs: u64) -> Result<bool, LumenError> {
        self.run("EXPIRE", format!("EXPIRE:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            async move { con.expire::<_, bool>(key, ttl_secs as i64).await }
        })
        .await
    }

    /// Whether a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool, LumenError> {
        self.run("EXISTS", format!("EXISTS:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            async move { con.exists::<_, bool>(key).await }
        })
        .await
    }

    /// Remaining TTL in seconds: -1 when no expiry, -2 when the key is absent.
    pub async fn ttl(&self, key: &str) -> Result<i64, LumenError> {
        self.run("TTL", format!("TTL:{key}"), || {
            let mut con = self.manager.clone();
            let key = key.to_string();
            async move { con.ttl::<_, i64>(key).await }
        })
        .await
    }

    /// Direct PING, bypassing the resilience layer. Used by the health
    /// monitor so probe traffic does not feed the circuit breaker.
    pub async fn ping(&self) -> Result<(), LumenError> {
        let mut con = self.manager.clone();
        redis::cmd("PING").query_async::<_, String>(&mut con).await?;
        Ok(())
    }

    /// Collects all keys matching a glob pattern via incremental SCAN.
    pub async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, LumenError> {
        self.run("SCAN", format!("SCAN:{pattern}"), || {
            let mut con = self.manager.clone();
            let pattern = pattern.to_string();
            async move {
                let mut keys = Vec::new();
                let mut cursor: u64 = 0;
                loop {
                    let (next, chunk): (u64, Vec<String>) = redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(&pattern)
                        .arg("COUNT")
                        .arg(100)
                        .query_async(&mut con)
                        .await?;
                    keys.extend(chunk);
                    if next == 0 {
                        break;
                    }
                    cursor = next;
                }
                Ok(keys)
            }
        })
        .await
    }
}
