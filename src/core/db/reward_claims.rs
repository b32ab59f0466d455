// src/core/db/reward_claims.rs

//! The reward-claim idempotency ledger.
//!
//! The composite primary key `(player_id, claim_type, claim_key)` makes
//! duplicate claims a database-level no-op via `ON CONFLICT DO NOTHING`, so
//! reward-granting commands stay idempotent across retries and concurrent
//! duplicates. Callers claim first, grant only on `Inserted`.

use crate::core::errors::LumenError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tracing::debug;

/// Result of a claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This call recorded the claim; the caller should grant the reward.
    Inserted,
    /// The claim already existed; the reward must not be granted again.
    AlreadyClaimed,
}

/// One recorded claim.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RewardClaim {
    pub player_id: i64,
    pub claim_type: String,
    pub claim_key: String,
    pub claimed_at: DateTime<Utc>,
}

/// Attempts to record a claim inside the caller's transaction. Exactly one of
/// any set of concurrent attempts for the same triple observes `Inserted`.
pub async fn claim(
    tx: &mut Transaction<'_, Postgres>,
    player_id: i64,
    claim_type: &str,
    claim_key: &str,
) -> Result<ClaimOutcome, LumenError> {
    let result = sqlx::query(
        r#"
        INSERT INTO reward_claims (player_id, claim_type, claim_key)
        VALUES ($1, $2, $3)
        ON CONFLICT (player_id, claim_type, claim_key) DO NOTHING
        "#,
    )
    .bind(player_id)
    .bind(claim_type)
    .bind(claim_key)
    .execute(&mut **tx)
    .await?;

    let outcome = if result.rows_affected() > 0 {
        ClaimOutcome::Inserted
    } else {
        ClaimOutcome::AlreadyClaimed
    };
    debug!(player_id, claim_type, claim_key, ?outcome, "reward claim attempted");
    Ok(outcome)
}

/// Recent claims for one player, newest first.
pub async fn claims_for_player(
    pool: &PgPool,
    player_id: i64,
    limit: i64,
) -> Result<Vec<RewardClaim>, LumenError> {
    let claims = sqlx::query_as::<_, RewardClaim>(
        r#"
        SELECT player_id, claim_type, claim_key, claimed_at
        FROM reward_claims
        WHERE player_id = $1
        ORDER BY claimed_at DESC
        LIMIT $2
        "#,
    )
    .bind(player_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(claims)
}

/// Recent claims of one type across all players, newest first. Used for
/// audit queries.
pub async fn claims_for_type(
    pool: &PgPool,
    claim_type: &str,
    limit: i64,
) -> Result<Vec<RewardClaim>, LumenError> {
    let claims = sqlx::query_as::<_, RewardClaim>(
        r#"
        SELECT player_id, claim_type, claim_key, claimed_at
        FROM reward_claims
        WHERE claim_type = $1
        ORDER BY claimed_at DESC
        LIMIT $2
        "#,
    )
    .bind(claim_type)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(claims)
}
