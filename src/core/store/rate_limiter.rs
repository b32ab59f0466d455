// src/core/store/rate_limiter.rs

//! Distributed rate limiting backed by the in-memory store.
//!
//! Token-bucket by default (a server-side atomic script that refills linearly
//! with elapsed time), fixed-window as the simple alternative. When the store
//! is unreachable the check degrades to the configured fallback mode rather
//! than failing the command path.

use crate::config::{RateLimitAlgorithm, RateLimitFallback, RateLimiterSettings};
use crate::core::errors::LumenError;
use crate::core::metrics as prom;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

/// Atomic token-bucket admission: reads `(tokens, last_refill)`, refills by
/// elapsed time, caps at the bucket size, subtracts the requested amount when
/// sufficient, and stores the bucket back with a long TTL.
static TOKEN_BUCKET_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r#"
local key = KEYS[1]
local max_tokens = tonumber(ARGV[1])
local refill_rate = tonumber(ARGV[2])
local requested = tonumber(ARGV[3])
local now = tonumber(ARGV[4])

local bucket = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(bucket[1])
local last_refill = tonumber(bucket[2])

if tokens == nil then
    tokens = max_tokens
    last_refill = now
end

local time_passed = now - last_refill
local new_tokens = math.min(max_tokens, tokens + (time_passed * refill_rate))

if new_tokens >= requested then
    new_tokens = new_tokens - requested
    redis.call('HMSET', key, 'tokens', new_tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 3600)
    return 1
else
    redis.call('HMSET', key, 'tokens', new_tokens, 'last_refill', now)
    redis.call('EXPIRE', key, 3600)
    return 0
end
"#,
    )
});

/// Index of the fixed window containing `now_secs`.
pub fn window_index(now_secs: u64, period_secs: u64) -> u64 {
    now_secs / period_secs.max(1)
}

/// Distributed rate limiter sharing state across all backend instances.
pub struct RateLimiter {
    connection: ConnectionManager,
    settings: RateLimiterSettings,
}

impl RateLimiter {
    pub fn new(connection: ConnectionManager, settings: RateLimiterSettings) -> Self {
        debug!(
            algorithm = %settings.algorithm,
            default_rate = settings.default_rate,
            default_period_secs = settings.default_period_secs,
            fallback_mode = %settings.fallback_mode,
            "rate limiter initialized"
        );
        Self {
            connection,
            settings,
        }
    }

    /// Checks whether an operation consuming `tokens` is within the limit.
    /// Never errors: on store failure the configured fallback mode decides.
    pub async fn check_limit(
        &self,
        key: &str,
        rate: Option<u32>,
        period_secs: Option<u64>,
        tokens: u32,
    ) -> bool {
        let rate = rate.unwrap_or(self.settings.default_rate);
        let period_secs = period_secs.unwrap_or(self.settings.default_period_secs);

        let result = match self.settings.algorithm {
            RateLimitAlgorithm::TokenBucket => {
                self.check_token_bucket(key, rate, period_secs, tokens).await
            }
            RateLimitAlgorithm::FixedWindow => {
                self.check_fixed_window(key, rate, period_secs, tokens).await
            }
        };

        match result {
            Ok(allowed) => {
                if !allowed {
                    prom::RATE_LIMIT_DENIED_TOTAL.inc();
                    info!(
                        key,
                        algorithm = %self.settings.algorithm,
                        rate,
                        period_secs,
                        tokens_requested = tokens,
                        "rate limit exceeded"
                    );
                }
                allowed
            }
            Err(e) => match self.settings.fallback_mode {
                RateLimitFallback::Allow => {
                    warn!(key, error = %e, "rate limiter failure, allowing operation (fallback: allow)");
                    true
                }
                RateLimitFallback::Deny => {
                    warn!(key, error = %e, "rate limiter failure, denying operation (fallback: deny)");
                    prom::RATE_LIMIT_DENIED_TOTAL.inc();
                    false
                }
            },
        }
    }

    async fn check_token_bucket(
        &self,
        key: &str,
        rate: u32,
        period_secs: u64,
        tokens: u32,
    ) -> Result<bool, LumenError> {
        let refill_rate = rate as f64 / period_secs as f64;
        let now = chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0;

        let mut con = self.connection.clone();
        let allowed: i64 = TOKEN_BUCKET_SCRIPT
            .key(format!("ratelimit:tb:{key}"))
            .arg(rate)
            .arg(refill_rate)
            .arg(tokens)
            .arg(now)
            .invoke_async(&mut con)
            .await?;
        Ok(allowed == 1)
    }

    async fn check_fixed_window(
        &self,
        key: &str,
        rate: u32,
        period_secs: u64,
        tokens: u32,
    ) -> Result<bool, LumenError> {
        let window = window_index(chrono::Utc::now().timestamp() as u64, period_secs);
        let window_key = format!("ratelimit:fw:{key}:{window}");

        let mut con = self.connection.clone();
        let count: i64 = con.incr(&window_key, tokens as i64).await?;

        // First increment of a fresh window sets the expiry.
        if count == tokens as i64 {
            con.expire::<_, ()>(&window_key, (period_secs * 2) as i64)
                .await?;
        }

        Ok(count <= rate as i64)
    }

    /// Resets all limiter state for a key (both algorithms).
    pub async fn reset(&self, key: &str) -> Result<(), LumenError> {
        let mut con = self.connection.clone();
        con.del::<_, u64>(format!("ratelimit:tb:{key}")).await?;

        // Fixed-window keys are time-suffixed; walk them out.
        let pattern = format!("ratelimit:fw:{key}:*");
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut con)
                .await?;
            if !keys.is_empty() {
                con.del::<_, u64>(keys).await?;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        info!(key, "rate limit reset");
        Ok(())
    }

    /// Remaining admissions for a key, or `None` when it cannot be determined.
    pub async fn remaining(&self, key: &str, rate: Option<u32>) -> Option<u32> {
        let rate = rate.unwrap_or(self.settings.default_rate);
        let mut con = self.connection.clone();

        let result: Result<Option<u32>, LumenError> = async {
            match self.settings.algorithm {
                RateLimitAlgorithm::TokenBucket => {
                    let bucket: Vec<Option<String>> = con
                        .hget(format!("ratelimit:tb:{key}"), &["tokens", "last_refill"])
                        .await?;
                    match bucket.first().and_then(|v| v.as_ref()) {
                        Some(tokens) => {
                            let tokens: f64 = tokens.parse().unwrap_or(0.0);
                            Ok(Some(tokens.max(0.0) as u32))
                        }
                        None => Ok(Some(rate)),
                    }
                }
                RateLimitAlgorithm::FixedWindow => {
                    let window = window_index(
                        chrono::Utc::now().timestamp() as u64,
                        self.settings.default_period_secs,
                    );
                    let count: Option<i64> = con
                        .get(format!("ratelimit:fw:{key}:{window}"))
                        .await?;
                    Ok(Some(
                        rate.saturating_sub(count.unwrap_or(0).max(0) as u32),
                    ))
                }
            }
        }
        .await;

        match result {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!(key, error = %e, "failed to read remaining rate limit");
                None
            }
        }
    }
}
