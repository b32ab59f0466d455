// src/core/cache/mod.rs

//! The two-tier cache engine: domain-shaped caches over the in-memory store
//! with versioned key templates, config-driven TTLs, and tag-based bulk
//! invalidation.
//!
//! Cache contents are never authoritative; the database is. Tag invalidation
//! is best-effort: markers are walked at invalidation time, so an entry whose
//! marker has already expired ages out via its own TTL instead.

pub mod keys;
pub mod metrics;

use crate::core::config::ConfigManager;
use crate::core::metrics as prom;
use crate::core::store::StoreService;
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub use keys::{CacheKey, CacheKind, player_tag};
pub use metrics::{CacheMetrics, CacheMetricsSummary};

/// One write in a [`CacheEngine::batch_set`] call.
#[derive(Debug, Clone)]
pub struct CacheWriteOp {
    pub key: CacheKey,
    pub data: Value,
    pub ttl_secs: Option<u64>,
    pub tags: Vec<String>,
}

/// Domain-shaped caching over the store client and the dynamic config.
pub struct CacheEngine {
    store: Arc<StoreService>,
    config: Arc<ConfigManager>,
    metrics: CacheMetrics,
}

impl CacheEngine {
    pub fn new(store: Arc<StoreService>, config: Arc<ConfigManager>) -> Self {
        Self {
            store,
            config,
            metrics: CacheMetrics::new(),
        }
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    /// TTL for a cache kind: dynamic config override, else the built-in
    /// fallback.
    pub fn ttl_for(&self, kind: CacheKind) -> u64 {
        self.config
            .get_u64(&kind.ttl_config_path(), kind.default_ttl_secs())
    }

    fn tag_registry_ttl(&self) -> u64 {
        self.config.get_u64("cache.tag_registry_ttl", 7200)
    }

    /// Health predicate: error budget and hit-rate floor, both config-driven.
    pub fn is_healthy(&self) -> bool {
        let max_errors = self.config.get_u64("cache.health.max_errors", 100);
        let min_hit_rate = self.config.get_f64("cache.health.min_hit_rate", 0.5);
        self.metrics.is_healthy(max_errors, min_hit_rate)
    }

    // ------------------------------------------------------------------
    // Generic write / read / invalidate
    // ------------------------------------------------------------------

    /// Serializes and stores an entry with the kind's TTL, then associates
    /// tags. Returns whether the write succeeded; failures are counted and
    /// never propagate.
    pub async fn set_entry<T: Serialize>(
        &self,
        key: &CacheKey,
        data: &T,
        ttl_secs: Option<u64>,
        tags: &[String],
    ) -> bool {
        let start = Instant::now();
        let rendered = key.render();
        let ttl = ttl_secs.unwrap_or_else(|| self.ttl_for(key.kind()));

        let value = match serde_json::to_value(data) {
            Ok(v) => v,
            Err(e) => {
                self.metrics.record_error();
                warn!(key = %rendered, error = %e, "failed to serialize cache payload");
                return false;
            }
        };

        match self.store.set_json(&rendered, &value, Some(ttl)).await {
            Ok(_) => {
                if !tags.is_empty() {
                    self.add_tags(&rendered, tags).await;
                }
                self.metrics.record_set(start.elapsed());
                debug!(key = %rendered, ttl_secs = ttl, ?tags, "cache set");
                true
            }
            Err(e) => {
                self.metrics.record_error();
                warn!(key = %rendered, error = %e, "cache set failed");
                false
            }
        }
    }

    /// Reads and deserializes an entry. Any failure reads as a miss.
    pub async fn get_entry<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let start = Instant::now();
        let rendered = key.render();
        let kind_label = key.kind().to_string();

        let value = match self.store.get_json(&rendered).await {
            Ok(v) => v,
            Err(e) => {
                self.metrics.record_error();
                self.metrics.record_miss(start.elapsed());
                prom::CACHE_MISSES_TOTAL
                    .with_label_values(&[&kind_label])
                    .inc();
                warn!(key = %rendered, error = %e, "cache read failed, treating as miss");
                return None;
            }
        };

        match value.and_then(|v| serde_json::from_value(v).ok()) {
            Some(decoded) => {
                self.metrics.record_hit(start.elapsed());
                prom::CACHE_HITS_TOTAL
                    .with_label_values(&[&kind_label])
                    .inc();
                debug!(key = %rendered, "cache hit");
                Some(decoded)
            }
            None => {
                self.metrics.record_miss(start.elapsed());
                prom::CACHE_MISSES_TOTAL
                    .with_label_values(&[&kind_label])
                    .inc();
                debug!(key = %rendered, "cache miss");
                None
            }
        }
    }

    /// Deletes a single entry.
    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        let rendered = key.render();
        match self.store.delete(&rendered).await {
            Ok(count) => {
                if count > 0 {
                    self.metrics.record_invalidation();
                    prom::CACHE_INVALIDATIONS_TOTAL.inc();
                }
                count > 0
            }
            Err(e) => {
                self.metrics.record_error();
                warn!(key = %rendered, error = %e, "cache invalidation failed");
                false
            }
        }
    }

    /// Writes tag markers for a cache key. Tagging failures never fail the
    /// write that triggered them.
    async fn add_tags(&self, cache_key: &str, tags: &[String]) {
        let ttl = self.tag_registry_ttl();
        for tag in tags {
            let marker = keys::tag_marker_key(tag, cache_key);
            if let Err(e) = self.store.set(&marker, "1", Some(ttl)).await {
                self.metrics.record_error();
                warn!(tag, cache_key, error = %e, "failed to write cache tag marker");
            }
        }
    }

    /// Invalidates every entry carrying `tag`. Returns the number of cache
    /// keys actually deleted; markers without a surviving entry count zero.
    pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
        let markers = match self.store.scan_keys(&keys::tag_pattern(tag)).await {
            Ok(markers) => markers,
            Err(e) => {
                self.metrics.record_error();
                warn!(tag, error = %e, "tag scan failed, nothing invalidated");
                return 0;
            }
        };

        if markers.is_empty() {
            debug!(tag, "no cache keys registered under tag");
            return 0;
        }

        let deletions = markers.iter().map(|marker| async move {
            let Some(cache_key) = keys::cache_key_from_marker(marker, tag) else {
                return 0usize;
            };
            let deleted = match self.store.delete(cache_key).await {
                Ok(count) => (count > 0) as usize,
                Err(e) => {
                    self.metrics.record_error();
                    warn!(tag, cache_key, error = %e, "failed to delete tagged cache key");
                    0
                }
            };
            // The marker goes regardless; it described this one entry.
            if let Err(e) = self.store.delete(marker).await {
                debug!(tag, marker, error = %e, "failed to delete tag marker");
            }
            deleted
        });

        let invalidated: usize = join_all(deletions).await.into_iter().sum();
        self.metrics.record_invalidations(invalidated as u64);
        prom::CACHE_INVALIDATIONS_TOTAL.inc_by(invalidated as f64);

        info!(
            tag,
            markers = markers.len(),
            invalidated, "tag-based invalidation completed"
        );
        invalidated
    }

    /// Invalidates several tags in parallel, returning per-tag counts.
    pub async fn invalidate_by_tags(&self, tags: &[String]) -> BTreeMap<String, usize> {
        let results = join_all(
            tags.iter()
                .map(|tag| async move { (tag.clone(), self.invalidate_by_tag(tag).await) }),
        )
        .await;
        results.into_iter().collect()
    }

    /// Executes a list of cache writes in parallel, returning a per-key
    /// success map.
    pub async fn batch_set(&self, operations: Vec<CacheWriteOp>) -> BTreeMap<String, bool> {
        if operations.is_empty() {
            return BTreeMap::new();
        }

        let writes = operations.into_iter().map(|op| async move {
            let rendered = op.key.render();
            let ok = self
                .set_entry(&op.key, &op.data, op.ttl_secs, &op.tags)
                .await;
            (rendered, ok)
        });

        let results: BTreeMap<String, bool> = join_all(writes).await.into_iter().collect();
        let succeeded = results.values().filter(|ok| **ok).count();
        info!(
            total = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "batch cache write completed"
        );
        results
    }

    // ------------------------------------------------------------------
    // Domain-shaped convenience APIs
    // ------------------------------------------------------------------

    pub async fn cache_player_resources<T: Serialize>(&self, player_id: i64, data: &T) -> bool {
        self.set_entry(
            &CacheKey::PlayerResources { player_id },
            data,
            None,
            &[player_tag(player_id), "resources".to_string()],
        )
        .await
    }

    pub async fn player_resources<T: DeserializeOwned>(&self, player_id: i64) -> Option<T> {
        self.get_entry(&CacheKey::PlayerResources { player_id }).await
    }

    pub async fn cache_active_modifiers<T: Serialize>(&self, player_id: i64, data: &T) -> bool {
        self.set_entry(
            &CacheKey::ActiveModifiers { player_id },
            data,
            None,
            &[player_tag(player_id), "modifiers".to_string()],
        )
        .await
    }

    pub async fn active_modifiers<T: DeserializeOwned>(&self, player_id: i64) -> Option<T> {
        self.get_entry(&CacheKey::ActiveModifiers { player_id }).await
    }

    pub async fn cache_maiden_collection<T: Serialize>(&self, player_id: i64, data: &T) -> bool {
        self.set_entry(
            &CacheKey::MaidenCollection { player_id },
            data,
            None,
            &[player_tag(player_id), "maiden".to_string()],
        )
        .await
    }

    pub async fn maiden_collection<T: DeserializeOwned>(&self, player_id: i64) -> Option<T> {
        self.get_entry(&CacheKey::MaidenCollection { player_id })
            .await
    }

    pub async fn cache_drop_charges<T: Serialize>(&self, player_id: i64, data: &T) -> bool {
        self.set_entry(
            &CacheKey::DropCharges { player_id },
            data,
            None,
            &[player_tag(player_id)],
        )
        .await
    }

    pub async fn drop_charges<T: DeserializeOwned>(&self, player_id: i64) -> Option<T> {
        self.get_entry(&CacheKey::DropCharges { player_id }).await
    }

    pub async fn cache_fusion_rates<T: Serialize>(&self, tier: u32, data: &T) -> bool {
        self.set_entry(
            &CacheKey::FusionRates { tier },
            data,
            None,
            &["fusion".to_string(), "global".to_string()],
        )
        .await
    }

    pub async fn fusion_rates<T: DeserializeOwned>(&self, tier: u32) -> Option<T> {
        self.get_entry(&CacheKey::FusionRates { tier }).await
    }

    pub async fn cache_leader_bonuses<T: Serialize>(
        &self,
        base_id: i64,
        tier: u32,
        data: &T,
    ) -> bool {
        self.set_entry(
            &CacheKey::LeaderBonuses { base_id, tier },
            data,
            None,
            &["leader".to_string(), "global".to_string()],
        )
        .await
    }

    pub async fn leader_bonuses<T: DeserializeOwned>(&self, base_id: i64, tier: u32) -> Option<T> {
        self.get_entry(&CacheKey::LeaderBonuses { base_id, tier })
            .await
    }

    pub async fn cache_daily_quest<T: Serialize>(
        &self,
        player_id: i64,
        date: &str,
        data: &T,
    ) -> bool {
        self.set_entry(
            &CacheKey::DailyQuest {
                player_id,
                date: date.to_string(),
            },
            data,
            None,
            &[player_tag(player_id), "daily".to_string()],
        )
        .await
    }

    pub async fn daily_quest<T: DeserializeOwned>(&self, player_id: i64, date: &str) -> Option<T> {
        self.get_entry(&CacheKey::DailyQuest {
            player_id,
            date: date.to_string(),
        })
        .await
    }

    pub async fn cache_leaderboard<T: Serialize>(&self, kind: &str, period: &str, data: &T) -> bool {
        self.set_entry(
            &CacheKey::Leaderboards {
                kind: kind.to_string(),
                period: period.to_string(),
            },
            data,
            None,
            &["leaderboard".to_string(), "global".to_string()],
        )
        .await
    }

    pub async fn leaderboard<T: DeserializeOwned>(&self, kind: &str, period: &str) -> Option<T> {
        self.get_entry(&CacheKey::Leaderboards {
            kind: kind.to_string(),
            period: period.to_string(),
        })
        .await
    }

    /// Drops every cache entry for one player via the per-player tag.
    pub async fn invalidate_player(&self, player_id: i64) -> usize {
        self.invalidate_by_tag(&player_tag(player_id)).await
    }
}
