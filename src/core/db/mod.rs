// src/core/db/mod.rs

//! The database service: connection pool, transaction scopes, and a circuit
//! breaker over the relational store.
//!
//! Transient failures (pool acquisition timeout, connection loss, deadlock)
//! are retried a bounded number of times; constraint and integrity violations
//! surface immediately. Transactions roll back automatically when dropped
//! without a commit, which is the scoped-resource contract callers rely on:
//! begin → mutate → commit, with any early return undoing everything.

pub mod player;
pub mod reward_claims;
pub mod schema;

use crate::config::Config;
use crate::core::errors::{LumenError, is_transient_sqlx_error};
use crate::core::metrics as prom;
use crate::core::resilience::{CircuitBreaker, CircuitSnapshot, RetryPolicy};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub use player::{Player, PlayerClass};
pub use reward_claims::{ClaimOutcome, RewardClaim};

/// Owns the Postgres pool and the database-side circuit breaker.
pub struct DatabaseService {
    pool: PgPool,
    breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl DatabaseService {
    /// Builds the pool, verifies connectivity, and ensures the owned tables
    /// exist.
    pub async fn connect(config: &Config) -> Result<Self, LumenError> {
        let db = &config.database;
        let pool = PgPoolOptions::new()
            .max_connections(db.pool_size + db.max_overflow)
            .acquire_timeout(Duration::from_secs(db.acquire_timeout_secs))
            .max_lifetime(Duration::from_secs(db.recycle_secs))
            .connect(&db.url)
            .await?;

        schema::ensure_schema(&pool).await?;

        info!(
            pool_size = db.pool_size,
            max_overflow = db.max_overflow,
            acquire_timeout_secs = db.acquire_timeout_secs,
            "database service connected"
        );

        Ok(Self {
            pool,
            breaker: CircuitBreaker::new("database", config.resilience.circuit),
            retry: RetryPolicy::new(config.resilience.retry),
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_snapshot(&self) -> CircuitSnapshot {
        self.breaker.snapshot()
    }

    /// Opens a transaction. The caller must `commit()`; dropping the
    /// transaction rolls it back.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, LumenError> {
        self.execute("begin_transaction", || self.pool.begin()).await
    }

    /// Runs a database operation through the circuit breaker with bounded
    /// retries for transient failures.
    pub async fn execute<T, F, Fut>(&self, operation_name: &str, op: F) -> Result<T, LumenError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.breaker.can_execute() {
            return Err(LumenError::CircuitBreakerOpen(operation_name.to_string()));
        }

        let attempts = self.retry.max_attempts().max(1);
        let start = Instant::now();

        for attempt in 1..=attempts {
            match op().await {
                Ok(value) => {
                    self.breaker.record_success();
                    prom::DB_OPERATIONS_TOTAL.with_label_values(&["ok"]).inc();
                    prom::DB_OPERATION_LATENCY_SECONDS.observe(start.elapsed().as_secs_f64());
                    if attempt > 1 {
                        info!(
                            operation = operation_name,
                            attempt, "database operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if is_transient_sqlx_error(&e) && attempt < attempts => {
                    self.breaker.record_failure();
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        operation = operation_name,
                        attempt,
                        retry_delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient database failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.breaker.record_failure();
                    prom::DB_OPERATIONS_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    error!(
                        operation = operation_name,
                        attempt,
                        error = %e,
                        "database operation failed"
                    );
                    return Err(e.into());
                }
            }
        }

        Err(LumenError::Internal(format!(
            "database operation '{operation_name}' failed without an error"
        )))
    }

    /// Lightweight connectivity probe.
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "database health check failed");
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // game_config table (owned by the dynamic config manager)
    // ------------------------------------------------------------------

    /// Loads every dynamic-config row as `(top_level_key, subtree)`.
    pub async fn load_game_config(&self) -> Result<Vec<(String, Value)>, LumenError> {
        let rows = self
            .execute("load_game_config", || {
                sqlx::query_as::<_, (String, Value)>(
                    "SELECT config_key, config_value FROM game_config",
                )
                .fetch_all(&self.pool)
            })
            .await?;
        debug!(rows = rows.len(), "loaded game_config rows");
        Ok(rows)
    }

    /// Transactionally upserts one dynamic-config row.
    pub async fn upsert_game_config(
        &self,
        config_key: &str,
        config_value: &Value,
        modified_by: &str,
    ) -> Result<(), LumenError> {
        let mut tx = self.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO game_config (config_key, config_value, modified_by, last_modified)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (config_key) DO UPDATE
                SET config_value = EXCLUDED.config_value,
                    modified_by = EXCLUDED.modified_by,
                    last_modified = NOW()
            "#,
        )
        .bind(config_key)
        .bind(config_value)
        .bind(modified_by)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }
}
