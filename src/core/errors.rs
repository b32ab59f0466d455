// src/core/errors.rs

//! Defines the primary error type for the entire application.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the backend.
/// Using `thiserror` allows for clean error definitions and automatic `From`
/// trait implementations. Infrastructure errors from `redis` and `sqlx` are
/// wrapped in `Arc` so the enum stays cheaply cloneable.
#[derive(Error, Debug, Clone)]
pub enum LumenError {
    #[error("Insufficient {resource}: required {required}, have {current}")]
    InsufficientResources {
        resource: String,
        required: i64,
        current: i64,
    },

    #[error("Circuit breaker is OPEN, operation '{0}' rejected")]
    CircuitBreakerOpen(String),

    #[error("Failed to acquire lock '{key}' within {waited_ms}ms")]
    LockAcquisitionTimeout { key: String, waited_ms: u64 },

    #[error("Config validation failed: {0}")]
    ConfigValidation(String),

    #[error("Config initialization failed: {0}")]
    ConfigInitialization(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Audit validation failed: {0}")]
    AuditValidation(String),

    #[error("Store error: {0}")]
    Store(Arc<redis::RedisError>),

    #[error("Database error: {0}")]
    Database(Arc<sqlx::Error>),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LumenError {
    /// Whether this error is a transient in-memory-store failure the
    /// resilience layer should retry: connection refused/reset, timeout, or a
    /// generic network error. Everything else fails immediately.
    pub fn is_transient_store_error(&self) -> bool {
        match self {
            LumenError::Store(e) => is_transient_redis_error(e),
            LumenError::Io(_) => true,
            _ => false,
        }
    }

    /// Whether this error is a transient relational-store failure worth a
    /// bounded retry: pool acquisition timeout, connection failure, or
    /// deadlock. Constraint and integrity violations are not.
    pub fn is_transient_db_error(&self) -> bool {
        match self {
            LumenError::Database(e) => is_transient_sqlx_error(e),
            LumenError::Io(_) => true,
            _ => false,
        }
    }
}

/// Transient classification for raw `redis` errors.
pub fn is_transient_redis_error(e: &redis::RedisError) -> bool {
    e.is_timeout()
        || e.is_connection_refusal()
        || e.is_connection_dropped()
        || matches!(e.kind(), redis::ErrorKind::IoError)
}

/// Transient classification for raw `sqlx` errors. Postgres deadlock
/// (40P01) and serialization failure (40001) are retryable; unique and
/// integrity violations surface immediately.
pub fn is_transient_sqlx_error(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
        sqlx::Error::Database(db) => {
            matches!(db.code().as_deref(), Some("40P01") | Some("40001"))
        }
        _ => false,
    }
}

// --- From trait implementations for easy error conversion ---

impl From<redis::RedisError> for LumenError {
    fn from(e: redis::RedisError) -> Self {
        LumenError::Store(Arc::new(e))
    }
}

impl From<sqlx::Error> for LumenError {
    fn from(e: sqlx::Error) -> Self {
        LumenError::Database(Arc::new(e))
    }
}

impl From<std::io::Error> for LumenError {
    fn from(e: std::io::Error) -> Self {
        LumenError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for LumenError {
    fn from(e: serde_json::Error) -> Self {
        LumenError::Serialization(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<serde_yaml::Error> for LumenError {
    fn from(e: serde_yaml::Error) -> Self {
        LumenError::Serialization(format!("YAML parse error: {e}"))
    }
}
