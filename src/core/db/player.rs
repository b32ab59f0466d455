// src/core/db/player.rs

//! The player aggregate: the root of all in-game state.
//!
//! A player row is only ever mutated while row-locked (`SELECT … FOR UPDATE`)
//! inside an open transaction, with the per-player distributed lock held
//! around it. The aggregate is fetched, mutated in memory, and written back
//! with [`Player::persist`]; no shared mutable state lives between requests.

use crate::config::GameSettings;
use crate::core::errors::LumenError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use strum_macros::{Display, EnumString};
use tracing::debug;

/// Permanent player class choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlayerClass {
    /// Combat specialist.
    Destroyer,
    /// Exploration specialist.
    Adapter,
    /// Shrine specialist.
    Invoker,
}

/// Max consumable values derived from stat allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaxStats {
    pub energy: i64,
    pub stamina: i64,
    pub hp: i64,
}

/// Core player data model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Player {
    pub id: i64,
    pub discord_id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub last_level_up: Option<DateTime<Utc>>,

    pub level: i64,
    pub experience: i64,

    pub lumees: i64,
    pub grace: i64,
    pub auric_coin: i64,

    pub energy: i64,
    pub max_energy: i64,
    pub stamina: i64,
    pub max_stamina: i64,
    pub hp: i64,
    pub max_hp: i64,

    pub drop_charges: i64,
    pub last_drop_regen: Option<DateTime<Utc>>,

    pub stat_points_available: i64,
    pub stat_points_spent: Json<HashMap<String, i64>>,

    pub fusion_shards: Json<HashMap<String, i64>>,

    pub total_attack: i64,
    pub total_defense: i64,
    pub total_power: i64,

    pub leader_maiden_id: Option<i64>,
    pub player_class: Option<String>,

    pub stats: Json<HashMap<String, i64>>,
}

impl Player {
    /// The parsed class tag, if one has been chosen.
    pub fn class(&self) -> Option<PlayerClass> {
        self.player_class.as_deref().and_then(|c| c.parse().ok())
    }

    /// Fusion shard count for a tier.
    pub fn fusion_shards_for_tier(&self, tier: u32) -> i64 {
        self.fusion_shards
            .get(&format!("tier_{tier}"))
            .copied()
            .unwrap_or(0)
    }

    /// Max consumables from stat allocation:
    /// `max = base + points_spent * per_point` for each stat.
    pub fn calculate_max_stats(&self, game: &GameSettings) -> MaxStats {
        let spent = |k: &str| self.stat_points_spent.get(k).copied().unwrap_or(0);
        MaxStats {
            energy: game.base_energy + spent("energy") * game.energy_per_point,
            stamina: game.base_stamina + spent("stamina") * game.stamina_per_point,
            hp: game.base_hp + spent("hp") * game.hp_per_point,
        }
    }

    /// Total stat points allocated across all stats.
    pub fn total_stat_points_spent(&self) -> i64 {
        self.stat_points_spent.values().sum()
    }

    /// Full resource refresh on level up: recompute maxes, refill resources,
    /// grant allocation points, stamp the audit timestamp.
    pub fn refresh_on_level_up(&mut self, game: &GameSettings) {
        let max = self.calculate_max_stats(game);
        self.energy = max.energy;
        self.stamina = max.stamina;
        self.hp = max.hp;
        self.drop_charges = 1;
        self.max_energy = max.energy;
        self.max_stamina = max.stamina;
        self.max_hp = max.hp;
        self.stat_points_available += game.points_per_level;
        self.last_level_up = Some(Utc::now());
        *self.stats.entry("level_ups".to_string()).or_insert(0) += 1;
    }

    /// Seconds until the next drop charge regenerates; zero when already at
    /// the single-charge cap or never used.
    pub fn drop_regen_seconds_remaining(&self, game: &GameSettings) -> i64 {
        if self.drop_charges >= 1 {
            return 0;
        }
        let Some(last) = self.last_drop_regen else {
            return 0;
        };
        let interval = game.drop_regen_minutes * 60;
        (interval - (Utc::now() - last).num_seconds()).max(0)
    }

    pub fn touch_activity(&mut self) {
        self.last_active = Utc::now();
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Fetches a player row under a pessimistic row lock. Must run inside an
    /// open transaction; the lock is held until commit or rollback.
    pub async fn fetch_for_update(
        tx: &mut Transaction<'_, Postgres>,
        discord_id: i64,
    ) -> Result<Option<Player>, LumenError> {
        let player = sqlx::query_as::<_, Player>("SELECT * FROM players WHERE discord_id = $1 FOR UPDATE")
            .bind(discord_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(player)
    }

    /// Fetches a row-locked player, creating the aggregate on first use.
    pub async fn fetch_or_create(
        tx: &mut Transaction<'_, Postgres>,
        discord_id: i64,
        game: &GameSettings,
    ) -> Result<Player, LumenError> {
        if let Some(player) = Self::fetch_for_update(tx, discord_id).await? {
            return Ok(player);
        }

        sqlx::query(
            r#"
            INSERT INTO players
                (discord_id, energy, max_energy, stamina, max_stamina, hp, max_hp)
            VALUES ($1, $2, $2, $3, $3, $4, $4)
            ON CONFLICT (discord_id) DO NOTHING
            "#,
        )
        .bind(discord_id)
        .bind(game.base_energy)
        .bind(game.base_stamina)
        .bind(game.base_hp)
        .execute(&mut **tx)
        .await?;

        debug!(discord_id, "player aggregate created on first use");

        Self::fetch_for_update(tx, discord_id)
            .await?
            .ok_or_else(|| {
                LumenError::Internal(format!("player {discord_id} missing after insert"))
            })
    }

    /// Writes the mutated aggregate back. The row must already be locked by
    /// this transaction.
    pub async fn persist(&self, tx: &mut Transaction<'_, Postgres>) -> Result<(), LumenError> {
        sqlx::query(
            r#"
            UPDATE players SET
                username = $2,
                last_active = $3,
                last_level_up = $4,
                level = $5,
                experience = $6,
                lumees = $7,
                grace = $8,
                auric_coin = $9,
                energy = $10,
                max_energy = $11,
                stamina = $12,
                max_stamina = $13,
                hp = $14,
                max_hp = $15,
                drop_charges = $16,
                last_drop_regen = $17,
                stat_points_available = $18,
                stat_points_spent = $19,
                fusion_shards = $20,
                total_attack = $21,
                total_defense = $22,
                total_power = $23,
                leader_maiden_id = $24,
                player_class = $25,
                stats = $26
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.username)
        .bind(self.last_active)
        .bind(self.last_level_up)
        .bind(self.level)
        .bind(self.experience)
        .bind(self.lumees)
        .bind(self.grace)
        .bind(self.auric_coin)
        .bind(self.energy)
        .bind(self.max_energy)
        .bind(self.stamina)
        .bind(self.max_stamina)
        .bind(self.hp)
        .bind(self.max_hp)
        .bind(self.drop_charges)
        .bind(self.last_drop_regen)
        .bind(self.stat_points_available)
        .bind(&self.stat_points_spent)
        .bind(&self.fusion_shards)
        .bind(self.total_attack)
        .bind(self.total_defense)
        .bind(self.total_power)
        .bind(self.leader_maiden_id)
        .bind(&self.player_class)
        .bind(&self.stats)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

impl Player {
    /// A fresh in-memory aggregate with the same defaults the schema applies
    /// on first use. Handy for previews and tests; persisted rows always come
    /// from [`Player::fetch_or_create`].
    pub fn fresh(discord_id: i64, game: &GameSettings) -> Player {
        let now = Utc::now();
        Player {
            id: discord_id,
            discord_id,
            username: "Unknown".to_string(),
            created_at: now,
            last_active: now,
            last_level_up: None,
            level: 1,
            experience: 0,
            lumees: 1000,
            grace: 0,
            auric_coin: 5,
            energy: game.base_energy,
            max_energy: game.base_energy,
            stamina: game.base_stamina,
            max_stamina: game.base_stamina,
            hp: game.base_hp,
            max_hp: game.base_hp,
            drop_charges: 0,
            last_drop_regen: None,
            stat_points_available: 0,
            stat_points_spent: Json(HashMap::from([
                ("energy".to_string(), 0),
                ("stamina".to_string(), 0),
                ("hp".to_string(), 0),
            ])),
            fusion_shards: Json(HashMap::new()),
            total_attack: 0,
            total_defense: 0,
            total_power: 0,
            leader_maiden_id: None,
            player_class: None,
            stats: Json(HashMap::new()),
        }
    }
}
