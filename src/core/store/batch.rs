// src/core/store/batch.rs

//! Batch operations: multi-GET/SET/DELETE/INCR in single round-trips.
//!
//! Key sets larger than the configured chunk size are transparently split,
//! issued sequentially, and merged preserving key order. A uniform TTL on
//! `mset` is applied through an atomic pipeline of SET + EXPIRE pairs.

use crate::core::errors::LumenError;
use crate::core::store::StoreService;
use redis::AsyncCommands;
use tracing::{debug, warn};

impl StoreService {
    /// Gets multiple keys, returning `(key, value)` pairs in input order.
    pub async fn mget(&self, keys: &[String]) -> Result<Vec<(String, Option<String>)>, LumenError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let max = self.batch_settings().max_keys_per_operation;
        if keys.len() > max {
            warn!(
                total_keys = keys.len(),
                max_keys = max,
                chunks = keys.len().div_ceil(max),
                "batch GET exceeds max keys, chunking operation"
            );
        }

        let mut merged = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(max) {
            let values = self
                .run("MGET", format!("MGET:{}", chunk.len()), || {
                    let mut con = self.connection();
                    let chunk = chunk.to_vec();
                    async move { con.mget::<_, Vec<Option<String>>>(chunk).await }
                })
                .await?;
            merged.extend(chunk.iter().cloned().zip(values));
        }

        debug!(
            key_count = keys.len(),
            found = merged.iter().filter(|(_, v)| v.is_some()).count(),
            "batch GET completed"
        );
        Ok(merged)
    }

    /// Sets multiple key-value pairs. With a TTL, each chunk runs as an
    /// atomic pipeline of SET + EXPIRE; without, plain MSET.
    pub async fn mset(
        &self,
        entries: &[(String, String)],
        ttl_secs: Option<u64>,
    ) -> Result<bool, LumenError> {
        if entries.is_empty() {
            return Ok(true);
        }

        let max = self.batch_settings().max_keys_per_operation;
        for chunk in entries.chunks(max) {
            self.run("MSET", format!("MSET:{}", chunk.len()), || {
                let mut con = self.connection();
                let chunk = chunk.to_vec();
                async move {
                    match ttl_secs {
                        Some(ttl) => {
                            let mut pipe = redis::pipe();
                            pipe.atomic();
                            for (key, value) in &chunk {
                                pipe.set(key, value).ignore();
                                pipe.expire(key, ttl as i64).ignore();
                            }
                            pipe.query_async::<_, ()>(&mut con).await
                        }
                        None => con.mset::<_, _, ()>(&chunk).await,
                    }
                }
            })
            .await?;
        }

        debug!(
            entry_count = entries.len(),
            ?ttl_secs,
            "batch SET completed"
        );
        Ok(true)
    }

    /// Deletes multiple keys, returning the total number removed.
    pub async fn mdelete(&self, keys: &[String]) -> Result<u64, LumenError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let max = self.batch_settings().max_keys_per_operation;
        let mut deleted = 0u64;
        for chunk in keys.chunks(max) {
            deleted += self
                .run("MDEL", format!("MDEL:{}", chunk.len()), || {
                    let mut con = self.connection();
                    let chunk = chunk.to_vec();
                    async move { con.del::<_, u64>(chunk).await }
                })
                .await?;
        }

        debug!(key_count = keys.len(), deleted, "batch DELETE completed");
        Ok(deleted)
    }

    /// Increments multiple keys in a pipeline, returning `(key, new_value)`
    /// pairs in input order.
    pub async fn mincr(&self, pairs: &[(String, i64)]) -> Result<Vec<(String, i64)>, LumenError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let max = self.batch_settings().max_keys_per_operation;
        let mut merged = Vec::with_capacity(pairs.len());
        for chunk in pairs.chunks(max) {
            let values = self
                .run("MINCR", format!("MINCR:{}", chunk.len()), || {
                    let mut con = self.connection();
                    let chunk = chunk.to_vec();
                    async move {
                        let mut pipe = redis::pipe();
                        for (key, amount) in &chunk {
                            pipe.cmd("INCRBY").arg(key).arg(*amount);
                        }
                        pipe.query_async::<_, Vec<i64>>(&mut con).await
                    }
                })
                .await?;
            merged.extend(chunk.iter().map(|(k, _)| k.clone()).zip(values));
        }

        Ok(merged)
    }
}
