// src/core/db/schema.rs

//! Bootstrap DDL for the tables the core owns: `players`, `game_config`, and
//! `reward_claims`. Statements are idempotent so startup can run them
//! unconditionally.

use crate::core::errors::LumenError;
use sqlx::PgPool;
use tracing::debug;

const CREATE_PLAYERS: &str = r#"
CREATE TABLE IF NOT EXISTS players (
    id                    BIGSERIAL PRIMARY KEY,
    discord_id            BIGINT NOT NULL UNIQUE,
    username              TEXT NOT NULL DEFAULT 'Unknown',
    created_at            TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_active           TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    last_level_up         TIMESTAMPTZ,
    level                 BIGINT NOT NULL DEFAULT 1,
    experience            BIGINT NOT NULL DEFAULT 0,
    lumees                BIGINT NOT NULL DEFAULT 1000,
    grace                 BIGINT NOT NULL DEFAULT 0,
    auric_coin            BIGINT NOT NULL DEFAULT 5,
    energy                BIGINT NOT NULL DEFAULT 100,
    max_energy            BIGINT NOT NULL DEFAULT 100,
    stamina               BIGINT NOT NULL DEFAULT 50,
    max_stamina           BIGINT NOT NULL DEFAULT 50,
    hp                    BIGINT NOT NULL DEFAULT 500,
    max_hp                BIGINT NOT NULL DEFAULT 500,
    drop_charges          BIGINT NOT NULL DEFAULT 0,
    last_drop_regen       TIMESTAMPTZ,
    stat_points_available BIGINT NOT NULL DEFAULT 0,
    stat_points_spent     JSONB NOT NULL DEFAULT '{"energy": 0, "stamina": 0, "hp": 0}',
    fusion_shards         JSONB NOT NULL DEFAULT '{}',
    total_attack          BIGINT NOT NULL DEFAULT 0,
    total_defense         BIGINT NOT NULL DEFAULT 0,
    total_power           BIGINT NOT NULL DEFAULT 0,
    leader_maiden_id      BIGINT,
    player_class          TEXT,
    stats                 JSONB NOT NULL DEFAULT '{}'
)
"#;

const PLAYERS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS ix_players_level ON players (level)",
    "CREATE INDEX IF NOT EXISTS ix_players_total_power ON players (total_power)",
    "CREATE INDEX IF NOT EXISTS ix_players_class_power ON players (player_class, total_power)",
    "CREATE INDEX IF NOT EXISTS ix_players_active_level ON players (last_active, level)",
];

const CREATE_GAME_CONFIG: &str = r#"
CREATE TABLE IF NOT EXISTS game_config (
    config_key    TEXT PRIMARY KEY,
    config_value  JSONB NOT NULL,
    modified_by   TEXT NOT NULL DEFAULT 'system',
    last_modified TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_REWARD_CLAIMS: &str = r#"
CREATE TABLE IF NOT EXISTS reward_claims (
    player_id  BIGINT NOT NULL,
    claim_type VARCHAR(50) NOT NULL,
    claim_key  VARCHAR(100) NOT NULL,
    claimed_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    PRIMARY KEY (player_id, claim_type, claim_key)
)
"#;

const REWARD_CLAIMS_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS ix_reward_claims_player ON reward_claims (player_id, claimed_at)",
    "CREATE INDEX IF NOT EXISTS ix_reward_claims_type ON reward_claims (claim_type, claimed_at)",
];

/// Creates the owned tables and indexes when they do not exist.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), LumenError> {
    sqlx::query(CREATE_PLAYERS).execute(pool).await?;
    sqlx::query(CREATE_GAME_CONFIG).execute(pool).await?;
    sqlx::query(CREATE_REWARD_CLAIMS).execute(pool).await?;
    for stmt in PLAYERS_INDEXES.iter().chain(REWARD_CLAIMS_INDEXES) {
        sqlx::query(stmt).execute(pool).await?;
    }
    debug!("database schema ensured");
    Ok(())
}
