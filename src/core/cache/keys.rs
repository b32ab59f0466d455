// src/core/cache/keys.rs

//! The versioned cache-key registry.
//!
//! Only the cache engine constructs keys; every logical cache has exactly one
//! template here. The `v2` segment exists for schema evolution: bumping it
//! orphans (and ages out) every entry written under the old layout.

use strum_macros::Display;

/// Namespace prefix for every cache entry.
const KEY_PREFIX: &str = "lumen:v2";

/// Namespace prefix for tag marker entries.
const TAG_PREFIX: &str = "lumen:v2:cache:tag";

/// The logical cache a key belongs to; drives TTL lookup and hit/miss labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum CacheKind {
    PlayerResources,
    ActiveModifiers,
    MaidenCollection,
    DropCharges,
    FusionRates,
    LeaderBonuses,
    DailyQuest,
    Leaderboards,
}

impl CacheKind {
    /// Dynamic-config path holding this cache's TTL override.
    pub fn ttl_config_path(self) -> String {
        format!("cache.ttl.{self}")
    }

    /// Built-in TTL fallback, in seconds, when no config override exists.
    pub fn default_ttl_secs(self) -> u64 {
        match self {
            // Hot per-player state.
            CacheKind::PlayerResources
            | CacheKind::MaidenCollection
            | CacheKind::DropCharges => 300,
            // Modifier stacks and leaderboard snapshots.
            CacheKind::ActiveModifiers | CacheKind::Leaderboards => 600,
            // Rarely-changing global game data.
            CacheKind::FusionRates | CacheKind::LeaderBonuses => 3600,
            // Date-scoped state.
            CacheKind::DailyQuest => 86400,
        }
    }
}

/// A fully-specified cache key. Rendering is the only way to obtain the
/// underlying store key string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheKey {
    PlayerResources { player_id: i64 },
    ActiveModifiers { player_id: i64 },
    MaidenCollection { player_id: i64 },
    DropCharges { player_id: i64 },
    FusionRates { tier: u32 },
    LeaderBonuses { base_id: i64, tier: u32 },
    DailyQuest { player_id: i64, date: String },
    Leaderboards { kind: String, period: String },
}

impl CacheKey {
    pub fn kind(&self) -> CacheKind {
        match self {
            CacheKey::PlayerResources { .. } => CacheKind::PlayerResources,
            CacheKey::ActiveModifiers { .. } => CacheKind::ActiveModifiers,
            CacheKey::MaidenCollection { .. } => CacheKind::MaidenCollection,
            CacheKey::DropCharges { .. } => CacheKind::DropCharges,
            CacheKey::FusionRates { .. } => CacheKind::FusionRates,
            CacheKey::LeaderBonuses { .. } => CacheKind::LeaderBonuses,
            CacheKey::DailyQuest { .. } => CacheKind::DailyQuest,
            CacheKey::Leaderboards { .. } => CacheKind::Leaderboards,
        }
    }

    /// Renders the namespaced store key.
    pub fn render(&self) -> String {
        match self {
            CacheKey::PlayerResources { player_id } => {
                format!("{KEY_PREFIX}:player:{player_id}:resources")
            }
            CacheKey::ActiveModifiers { player_id } => {
                format!("{KEY_PREFIX}:modifiers:{player_id}")
            }
            CacheKey::MaidenCollection { player_id } => {
                format!("{KEY_PREFIX}:player:{player_id}:maidens")
            }
            CacheKey::DropCharges { player_id } => format!("{KEY_PREFIX}:drop:{player_id}"),
            CacheKey::FusionRates { tier } => format!("{KEY_PREFIX}:fusion:rates:{tier}"),
            CacheKey::LeaderBonuses { base_id, tier } => {
                format!("{KEY_PREFIX}:leader:{base_id}:{tier}")
            }
            CacheKey::DailyQuest { player_id, date } => {
                format!("{KEY_PREFIX}:daily:{player_id}:{date}")
            }
            CacheKey::Leaderboards { kind, period } => {
                format!("{KEY_PREFIX}:leaderboard:{kind}:{period}")
            }
        }
    }
}

/// Marker key associating `tag` with a cache key.
pub fn tag_marker_key(tag: &str, cache_key: &str) -> String {
    format!("{TAG_PREFIX}:{tag}:{cache_key}")
}

/// Scan pattern matching every marker for a tag.
pub fn tag_pattern(tag: &str) -> String {
    format!("{TAG_PREFIX}:{tag}:*")
}

/// Recovers the cache key a marker points at.
pub fn cache_key_from_marker<'a>(marker: &'a str, tag: &str) -> Option<&'a str> {
    marker.strip_prefix(&format!("{TAG_PREFIX}:{tag}:"))
}

/// The standard per-player bulk-invalidation tag.
pub fn player_tag(player_id: i64) -> String {
    format!("player:{player_id}")
}
