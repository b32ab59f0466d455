// src/core/store/lock.rs

//! Token-based distributed locking.
//!
//! Acquisition is `SET key token NX EX timeout` with a cryptographically
//! random token, retried on an interval until the wait deadline. Release is a
//! server-side compare-and-delete script that only deletes the key while it
//! still holds the caller's token, so an expired or stolen lock can never be
//! released by the wrong holder. The key's TTL is the crash backstop: a
//! holder that dies without releasing leaks nothing past `timeout`.
//!
//! A lock's `timeout` must exceed the longest plausible critical section;
//! when it does not, the release script returns 0 and the overrun is logged.
//! Ownership metadata is mirrored into `lock:tracking:{key}` hashes for
//! debugging only.

use crate::core::errors::LumenError;
use crate::core::metrics as prom;
use crate::core::store::StoreService;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Compare-and-delete: the lock key is deleted only while it holds our token.
static UNLOCK_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#,
    )
});

const TRACKING_PREFIX: &str = "lock:tracking:";

/// Tracking hashes outlive their lock by this margin so a just-expired lock
/// can still be inspected.
const TRACKING_TTL_MARGIN_SECS: u64 = 10;

/// Per-acquisition overrides; unset fields fall back to configured defaults.
#[derive(Debug, Clone, Default)]
pub struct LockOptions {
    pub timeout_secs: Option<u64>,
    pub wait_timeout_secs: Option<u64>,
    pub retry_interval_ms: Option<u64>,
    /// Operation tag recorded in the ownership hash (e.g. "fusion").
    pub operation: Option<String>,
    /// Owner identifier recorded in the ownership hash (e.g. a player id).
    pub owner_id: Option<String>,
}

/// Ownership metadata for a held lock, read from the tracking hash.
#[derive(Debug, Clone, Serialize)]
pub struct LockOwnerInfo {
    pub lock_key: String,
    pub token: String,
    pub acquired_at: i64,
    pub expires_at: i64,
    pub timeout_secs: u64,
    pub held_secs: i64,
    pub operation: Option<String>,
    pub owner_id: Option<String>,
}

/// A held distributed lock.
///
/// Call [`LockGuard::release`] at the end of the critical section. Dropping
/// the guard without releasing is safe (the key expires on its own) but logs
/// a warning, because it leaves the lock held for the full timeout.
pub struct LockGuard {
    key: String,
    token: String,
    connection: ConnectionManager,
    metrics: Arc<super::StoreMetrics>,
    acquired_at: Instant,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Releases the lock via compare-and-delete. Returns `true` when the lock
    /// was still ours, `false` when it had already expired or been stolen.
    /// Failures are logged and swallowed: the key expires on its own.
    pub async fn release(mut self) -> bool {
        self.released = true;
        let hold = self.acquired_at.elapsed();
        prom::LOCK_HOLD_SECONDS.observe(hold.as_secs_f64());

        let mut con = self.connection.clone();
        let released: i64 = match UNLOCK_SCRIPT
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut con)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                warn!(
                    lock_key = %self.key,
                    error = %e,
                    "failed to release lock (it will expire automatically)"
                );
                return false;
            }
        };

        let owned = released > 0;
        self.metrics.record_lock_release(hold, owned);

        // Best-effort removal of the ownership hash either way.
        let tracking_key = format!("{TRACKING_PREFIX}{}", self.key);
        if let Err(e) = con.del::<_, u64>(&tracking_key).await {
            debug!(lock_key = %self.key, error = %e, "failed to remove lock tracking entry");
        }

        if owned {
            debug!(
                lock_key = %self.key,
                hold_ms = hold.as_millis() as u64,
                "lock released"
            );
        } else {
            warn!(
                lock_key = %self.key,
                hold_ms = hold.as_millis() as u64,
                "lock already expired or stolen before release; critical section outlived the lock timeout"
            );
        }
        owned
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.released {
            warn!(
                lock_key = %self.key,
                "lock guard dropped without release; key will expire via TTL"
            );
        }
    }
}

impl StoreService {
    /// Acquires a distributed lock, waiting up to the configured (or
    /// overridden) wait timeout. A wait timeout of zero attempts exactly
    /// once.
    ///
    /// # Errors
    ///
    /// `LockAcquisitionTimeout` when the lock could not be obtained within
    /// the wait deadline.
    pub async fn acquire_lock(
        &self,
        key: &str,
        options: LockOptions,
    ) -> Result<LockGuard, LumenError> {
        let settings = self.lock_settings();
        let timeout_secs = options.timeout_secs.unwrap_or(settings.timeout_secs);
        let wait_timeout = Duration::from_secs(
            options
                .wait_timeout_secs
                .unwrap_or(settings.wait_timeout_secs),
        );
        let retry_interval = Duration::from_millis(
            options
                .retry_interval_ms
                .unwrap_or(settings.retry_interval_ms),
        );

        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + wait_timeout;

        loop {
            let mut con = self.connection();
            let attempt: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
                .arg(key)
                .arg(&token)
                .arg("NX")
                .arg("EX")
                .arg(timeout_secs)
                .query_async(&mut con)
                .await;

            match attempt {
                Ok(Some(_)) => {
                    let waited = started.elapsed();
                    self.metrics().record_lock_acquisition(waited, true);
                    prom::LOCKS_ACQUIRED_TOTAL.inc();
                    prom::LOCK_WAIT_SECONDS.observe(waited.as_secs_f64());

                    self.track_lock_ownership(key, &token, timeout_secs, &options)
                        .await;

                    debug!(
                        lock_key = key,
                        timeout_secs,
                        wait_ms = waited.as_millis() as u64,
                        operation = options.operation.as_deref(),
                        owner_id = options.owner_id.as_deref(),
                        "lock acquired"
                    );

                    return Ok(LockGuard {
                        key: key.to_string(),
                        token,
                        connection: self.connection(),
                        metrics: Arc::clone(self.metrics_arc()),
                        acquired_at: Instant::now(),
                        released: false,
                    });
                }
                Ok(None) => {
                    // Held by someone else; fall through to the deadline check.
                }
                Err(e) => {
                    // Keep trying until the deadline; transient store trouble
                    // should not immediately fail a lock-protected command.
                    error!(lock_key = key, error = %e, "lock acquisition attempt failed");
                }
            }

            if Instant::now() >= deadline {
                let waited = started.elapsed();
                self.metrics().record_lock_acquisition(waited, false);
                prom::LOCK_TIMEOUTS_TOTAL.inc();
                warn!(
                    lock_key = key,
                    wait_timeout_secs = wait_timeout.as_secs(),
                    waited_ms = waited.as_millis() as u64,
                    "failed to acquire lock within wait timeout"
                );
                return Err(LumenError::LockAcquisitionTimeout {
                    key: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            tokio::time::sleep(retry_interval).await;
        }
    }

    /// Records lock ownership metadata for debugging. Tracking failures must
    /// never fail the acquisition.
    async fn track_lock_ownership(
        &self,
        key: &str,
        token: &str,
        timeout_secs: u64,
        options: &LockOptions,
    ) {
        let tracking_key = format!("{TRACKING_PREFIX}{key}");
        let now = chrono::Utc::now().timestamp();
        let mut fields: Vec<(String, String)> = vec![
            ("token".into(), token.to_string()),
            ("acquired_at".into(), now.to_string()),
            ("expires_at".into(), (now + timeout_secs as i64).to_string()),
            ("timeout".into(), timeout_secs.to_string()),
        ];
        if let Some(op) = &options.operation {
            fields.push(("operation".into(), op.clone()));
        }
        if let Some(owner) = &options.owner_id {
            fields.push(("owner_id".into(), owner.clone()));
        }

        let mut con = self.connection();
        let result: Result<(), redis::RedisError> = async {
            con.hset_multiple::<_, _, _, ()>(&tracking_key, &fields)
                .await?;
            con.expire::<_, ()>(&tracking_key, (timeout_secs + TRACKING_TTL_MARGIN_SECS) as i64)
                .await?;
            Ok(())
        }
        .await;

        if let Err(e) = result {
            warn!(lock_key = key, error = %e, "failed to track lock ownership");
        }
    }

    /// Reads the ownership hash for a lock, if one is held and tracked.
    pub async fn lock_owner(&self, key: &str) -> Result<Option<LockOwnerInfo>, LumenError> {
        let tracking_key = format!("{TRACKING_PREFIX}{key}");
        let mut con = self.connection();
        let data: std::collections::HashMap<String, String> =
            con.hgetall(&tracking_key).await.map_err(LumenError::from)?;
        if data.is_empty() {
            return Ok(None);
        }

        let acquired_at = data
            .get("acquired_at")
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0);
        Ok(Some(LockOwnerInfo {
            lock_key: key.to_string(),
            token: data.get("token").cloned().unwrap_or_default(),
            acquired_at,
            expires_at: data
                .get("expires_at")
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0),
            timeout_secs: data
                .get("timeout")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0),
            held_secs: (chrono::Utc::now().timestamp() - acquired_at).max(0),
            operation: data.get("operation").cloned(),
            owner_id: data.get("owner_id").cloned(),
        }))
    }

    /// Lists all currently tracked locks for debugging.
    pub async fn active_locks(&self) -> Result<Vec<LockOwnerInfo>, LumenError> {
        let tracking_keys = self.scan_keys(&format!("{TRACKING_PREFIX}*")).await?;
        let mut locks = Vec::with_capacity(tracking_keys.len());
        for tracking_key in tracking_keys {
            let lock_key = tracking_key
                .strip_prefix(TRACKING_PREFIX)
                .unwrap_or(&tracking_key);
            if let Some(info) = self.lock_owner(lock_key).await? {
                locks.push(info);
            }
        }
        Ok(locks)
    }
}
