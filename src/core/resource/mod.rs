// src/core/resource/mod.rs

//! The resource transaction service: the only component permitted to mutate
//! player currencies and consumables.
//!
//! Concurrency contract: callers must hold the per-player distributed lock
//! AND have the player row-locked (`SELECT … FOR UPDATE`) inside an open
//! transaction before calling `grant` or `consume`. Violating this is a
//! correctness bug, not a runtime error. After a successful mutation the
//! caller is responsible for invalidating the player's tagged cache entries.
//!
//! Modifier composition is multiplicative, never additive:
//! `final = floor(base * leader_multiplier * class_multiplier)`. Caps apply
//! after modifiers; capped shortfalls are reported in `caps_hit`.

use crate::config::GameSettings;
use crate::core::audit::AuditLogger;
use crate::core::config::ConfigManager;
use crate::core::db::Player;
use crate::core::errors::LumenError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use strum_macros::{Display, EnumString};
use tracing::{info, warn};

/// Every resource the service can grant or consume.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Lumees,
    Grace,
    AuricCoin,
    Experience,
    Energy,
    Stamina,
    Hp,
    DropCharges,
}

impl ResourceKind {
    /// Currencies boosted by `income_boost`.
    fn is_income(self) -> bool {
        matches!(
            self,
            ResourceKind::Lumees | ResourceKind::Grace | ResourceKind::AuricCoin
        )
    }
}

/// Multiplicative modifiers applied to grants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Modifiers {
    pub income_boost: f64,
    pub xp_boost: f64,
}

impl Modifiers {
    pub fn neutral() -> Self {
        Self {
            income_boost: 1.0,
            xp_boost: 1.0,
        }
    }
}

impl Default for Modifiers {
    fn default() -> Self {
        Self::neutral()
    }
}

/// Source of leader-derived multipliers. Gameplay layers plug in a provider
/// backed by the maiden roster; the default reads flat bonuses from dynamic
/// config.
pub trait ModifierProvider: Send + Sync {
    fn active_modifiers(&self, player: &Player) -> Modifiers;
}

/// Default provider: leader bonuses from the dynamic config tree.
pub struct ConfigModifierProvider {
    config: Arc<ConfigManager>,
}

impl ConfigModifierProvider {
    pub fn new(config: Arc<ConfigManager>) -> Self {
        Self { config }
    }
}

impl ModifierProvider for ConfigModifierProvider {
    fn active_modifiers(&self, _player: &Player) -> Modifiers {
        Modifiers {
            income_boost: self.config.get_f64("leader_bonuses.income_boost", 1.0),
            xp_boost: self.config.get_f64("leader_bonuses.xp_boost", 1.0),
        }
    }
}

/// Outcome of a grant.
#[derive(Debug, Clone, Serialize)]
pub struct GrantOutcome {
    /// Actual amounts credited after modifiers and caps.
    pub granted: BTreeMap<ResourceKind, i64>,
    pub modifiers_applied: Modifiers,
    pub caps_hit: Vec<ResourceKind>,
    pub old_values: BTreeMap<ResourceKind, i64>,
    pub new_values: BTreeMap<ResourceKind, i64>,
}

/// Outcome of a consume.
#[derive(Debug, Clone, Serialize)]
pub struct ConsumeOutcome {
    pub consumed: BTreeMap<ResourceKind, i64>,
    pub old_values: BTreeMap<ResourceKind, i64>,
    pub new_values: BTreeMap<ResourceKind, i64>,
}

/// Counter set for the resource service.
#[derive(Debug, Default)]
pub struct ResourceMetrics {
    grants: AtomicU64,
    consumes: AtomicU64,
    checks: AtomicU64,
    lumees_granted: AtomicU64,
    grace_granted: AtomicU64,
    lumees_consumed: AtomicU64,
    grace_consumed: AtomicU64,
    caps_hit: AtomicU64,
    insufficient_errors: AtomicU64,
    errors: AtomicU64,
}

/// Derived snapshot of resource-service metrics.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceMetricsSummary {
    pub grants: u64,
    pub consumes: u64,
    pub checks: u64,
    pub lumees_granted: u64,
    pub grace_granted: u64,
    pub lumees_consumed: u64,
    pub grace_consumed: u64,
    pub caps_hit: u64,
    pub insufficient_errors: u64,
    pub errors: u64,
}

impl ResourceMetrics {
    pub fn summary(&self) -> ResourceMetricsSummary {
        ResourceMetricsSummary {
            grants: self.grants.load(Ordering::Relaxed),
            consumes: self.consumes.load(Ordering::Relaxed),
            checks: self.checks.load(Ordering::Relaxed),
            lumees_granted: self.lumees_granted.load(Ordering::Relaxed),
            grace_granted: self.grace_granted.load(Ordering::Relaxed),
            lumees_consumed: self.lumees_consumed.load(Ordering::Relaxed),
            grace_consumed: self.grace_consumed.load(Ordering::Relaxed),
            caps_hit: self.caps_hit.load(Ordering::Relaxed),
            insufficient_errors: self.insufficient_errors.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Centralized resource transaction and modifier application.
pub struct ResourceService {
    audit: Arc<AuditLogger>,
    config: Arc<ConfigManager>,
    game: GameSettings,
    modifier_provider: Arc<dyn ModifierProvider>,
    metrics: ResourceMetrics,
}

impl ResourceService {
    pub fn new(
        audit: Arc<AuditLogger>,
        config: Arc<ConfigManager>,
        game: GameSettings,
        modifier_provider: Arc<dyn ModifierProvider>,
    ) -> Self {
        Self {
            audit,
            config,
            game,
            modifier_provider,
            metrics: ResourceMetrics::default(),
        }
    }

    pub fn metrics(&self) -> &ResourceMetrics {
        &self.metrics
    }

    fn grace_cap(&self) -> i64 {
        self.config
            .get_i64("resource_system.grace_max_cap", self.game.grace_max_cap)
    }

    /// Grants resources with optional modifier application.
    ///
    /// Modifiers multiply (`income_boost` on currencies, `xp_boost` on
    /// experience) and the result is floored to an integer; then caps apply:
    /// grace saturates at its configured cap, consumables at their per-player
    /// max, drop charges at one. One audit event is emitted per call.
    pub async fn grant(
        &self,
        player: &mut Player,
        resources: &BTreeMap<ResourceKind, i64>,
        source: &str,
        apply_modifiers: bool,
        context: Option<&str>,
    ) -> Result<GrantOutcome, LumenError> {
        let start = Instant::now();
        self.metrics.grants.fetch_add(1, Ordering::Relaxed);

        let kinds: Vec<ResourceKind> = resources.keys().copied().collect();
        let modifiers = if apply_modifiers {
            self.calculate_modifiers(player, &kinds)
        } else {
            Modifiers::neutral()
        };

        let mut granted = BTreeMap::new();
        let mut caps_hit = Vec::new();
        let mut old_values = BTreeMap::new();
        let mut new_values = BTreeMap::new();

        for (&kind, &base) in resources {
            if base <= 0 {
                continue;
            }
            let old = read_resource(player, kind);
            old_values.insert(kind, old);

            let mut amount = if apply_modifiers {
                if kind.is_income() {
                    (base as f64 * modifiers.income_boost).floor() as i64
                } else if kind == ResourceKind::Experience {
                    (base as f64 * modifiers.xp_boost).floor() as i64
                } else {
                    base
                }
            } else {
                base
            };

            match kind {
                ResourceKind::Grace => {
                    let cap = self.grace_cap();
                    let mut new_value = old.saturating_add(amount);
                    if new_value > cap {
                        amount = cap - old;
                        new_value = cap;
                        caps_hit.push(kind);
                        self.metrics.caps_hit.fetch_add(1, Ordering::Relaxed);
                    }
                    player.grace = new_value;
                    self.metrics
                        .grace_granted
                        .fetch_add(amount.max(0) as u64, Ordering::Relaxed);
                }
                ResourceKind::Lumees => {
                    player.lumees = player.lumees.saturating_add(amount);
                    self.metrics
                        .lumees_granted
                        .fetch_add(amount.max(0) as u64, Ordering::Relaxed);
                }
                ResourceKind::AuricCoin => {
                    player.auric_coin = player.auric_coin.saturating_add(amount);
                }
                ResourceKind::Experience => {
                    player.experience = player.experience.saturating_add(amount);
                }
                ResourceKind::Energy => {
                    let new_value = (old + amount).min(player.max_energy);
                    amount = new_value - old;
                    player.energy = new_value;
                }
                ResourceKind::Stamina => {
                    let new_value = (old + amount).min(player.max_stamina);
                    amount = new_value - old;
                    player.stamina = new_value;
                }
                ResourceKind::Hp => {
                    let new_value = (old + amount).min(player.max_hp);
                    amount = new_value - old;
                    player.hp = new_value;
                }
                ResourceKind::DropCharges => {
                    let new_value = (old + amount).min(1);
                    amount = new_value - old;
                    player.drop_charges = new_value;
                }
            }

            granted.insert(kind, amount);
            new_values.insert(kind, read_resource(player, kind));
        }

        let mut details = Map::new();
        details.insert("resources_granted".into(), json!(granted));
        details.insert("base_amounts".into(), json!(resources));
        details.insert("modifiers".into(), json!(modifiers));
        details.insert("caps_hit".into(), json!(caps_hit));
        details.insert("old_values".into(), json!(old_values));
        details.insert("new_values".into(), json!(new_values));
        details.insert("source".into(), json!(source));

        self.audit
            .log(
                player.discord_id,
                &format!("resource_grant_{source}"),
                details,
                Some(&format!("grant:{source}")),
                context_meta(context),
                true,
            )
            .await?;

        info!(
            player_id = player.discord_id,
            source,
            ?granted,
            ?caps_hit,
            grant_time_us = start.elapsed().as_micros() as u64,
            "resources granted"
        );

        Ok(GrantOutcome {
            granted,
            modifiers_applied: modifiers,
            caps_hit,
            old_values,
            new_values,
        })
    }

    /// Consumes resources after verifying that every requested amount is
    /// available. When any resource is short the aggregate is untouched and
    /// `InsufficientResources` carries the first shortfall.
    pub async fn consume(
        &self,
        player: &mut Player,
        resources: &BTreeMap<ResourceKind, i64>,
        source: &str,
        context: Option<&str>,
    ) -> Result<ConsumeOutcome, LumenError> {
        self.metrics.consumes.fetch_add(1, Ordering::Relaxed);

        // Phase one: verify everything before touching anything.
        let mut old_values = BTreeMap::new();
        for (&kind, &amount) in resources {
            if amount <= 0 {
                continue;
            }
            let current = read_resource(player, kind);
            old_values.insert(kind, current);
            if current < amount {
                self.metrics
                    .insufficient_errors
                    .fetch_add(1, Ordering::Relaxed);
                return Err(LumenError::InsufficientResources {
                    resource: kind.to_string(),
                    required: amount,
                    current,
                });
            }
        }

        // Phase two: debit in a single pass.
        let mut consumed = BTreeMap::new();
        let mut new_values = BTreeMap::new();
        for (&kind, &amount) in resources {
            if amount <= 0 {
                continue;
            }
            write_resource(player, kind, read_resource(player, kind) - amount);
            consumed.insert(kind, amount);
            new_values.insert(kind, read_resource(player, kind));

            match kind {
                ResourceKind::Lumees => {
                    self.metrics
                        .lumees_consumed
                        .fetch_add(amount as u64, Ordering::Relaxed);
                }
                ResourceKind::Grace => {
                    self.metrics
                        .grace_consumed
                        .fetch_add(amount as u64, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        let mut details = Map::new();
        details.insert("resources_consumed".into(), json!(consumed));
        details.insert("old_values".into(), json!(old_values));
        details.insert("new_values".into(), json!(new_values));
        details.insert("source".into(), json!(source));

        self.audit
            .log(
                player.discord_id,
                &format!("resource_consume_{source}"),
                details,
                Some(&format!("consume:{source}")),
                context_meta(context),
                true,
            )
            .await?;

        info!(
            player_id = player.discord_id,
            source,
            ?consumed,
            "resources consumed"
        );

        Ok(ConsumeOutcome {
            consumed,
            old_values,
            new_values,
        })
    }

    /// Read-only availability check. No audit event.
    pub fn check(&self, player: &Player, resources: &BTreeMap<ResourceKind, i64>) -> bool {
        self.metrics.checks.fetch_add(1, Ordering::Relaxed);
        resources
            .iter()
            .filter(|&(_, &amount)| amount > 0)
            .all(|(&kind, &amount)| read_resource(player, kind) >= amount)
    }

    /// Active multipliers for a set of resource kinds. Early-exits to neutral
    /// when no modifier-sensitive kind is requested or the player has no
    /// leader assigned. Leader and class multipliers compose multiplicatively.
    pub fn calculate_modifiers(&self, player: &Player, kinds: &[ResourceKind]) -> Modifiers {
        let needs_income = kinds.iter().any(|k| k.is_income());
        let needs_xp = kinds.contains(&ResourceKind::Experience);
        if !needs_income && !needs_xp {
            return Modifiers::neutral();
        }

        let mut modifiers = Modifiers::neutral();

        if player.leader_maiden_id.is_some() {
            let leader = self.modifier_provider.active_modifiers(player);
            if needs_income {
                modifiers.income_boost *= leader.income_boost;
            }
            if needs_xp {
                modifiers.xp_boost *= leader.xp_boost;
            }
        }

        if let Some(class) = player.class() {
            let prefix = format!("class_bonuses.{class}");
            if needs_income {
                modifiers.income_boost *= self.config.get_f64(&format!("{prefix}.income_boost"), 1.0);
            }
            if needs_xp {
                modifiers.xp_boost *= self.config.get_f64(&format!("{prefix}.xp_boost"), 1.0);
            }
        }

        modifiers
    }

    /// Applies externally calculated regeneration amounts, respecting caps.
    /// Returns the amounts actually regenerated.
    pub fn apply_regeneration(
        &self,
        player: &mut Player,
        amounts: &BTreeMap<ResourceKind, i64>,
    ) -> BTreeMap<ResourceKind, i64> {
        let mut actual = BTreeMap::new();
        for (&kind, &amount) in amounts {
            if amount <= 0 {
                continue;
            }
            let (old, max) = match kind {
                ResourceKind::Energy => (player.energy, player.max_energy),
                ResourceKind::Stamina => (player.stamina, player.max_stamina),
                ResourceKind::Hp => (player.hp, player.max_hp),
                ResourceKind::DropCharges => (player.drop_charges, 1),
                _ => {
                    warn!(resource = %kind, "regeneration only applies to consumables, skipped");
                    continue;
                }
            };
            let new_value = (old + amount).min(max);
            write_resource(player, kind, new_value);
            actual.insert(kind, new_value - old);
        }
        actual
    }

    /// Snapshot of a player's currencies, consumables, and active modifiers
    /// for display layers.
    pub fn resource_summary(&self, player: &Player) -> serde_json::Value {
        let modifiers = self.calculate_modifiers(
            player,
            &[
                ResourceKind::Lumees,
                ResourceKind::Grace,
                ResourceKind::AuricCoin,
                ResourceKind::Experience,
            ],
        );
        json!({
            "currencies": {
                "lumees": player.lumees,
                "grace": player.grace,
                "auric_coin": player.auric_coin,
            },
            "consumables": {
                "energy": { "current": player.energy, "max": player.max_energy },
                "stamina": { "current": player.stamina, "max": player.max_stamina },
                "hp": { "current": player.hp, "max": player.max_hp },
                "drop_charges": {
                    "current": player.drop_charges,
                    "max": 1,
                    "regen_seconds_remaining": player.drop_regen_seconds_remaining(&self.game),
                },
            },
            "modifiers": modifiers,
        })
    }
}

/// Current value of one resource on the aggregate.
fn read_resource(player: &Player, kind: ResourceKind) -> i64 {
    match kind {
        ResourceKind::Lumees => player.lumees,
        ResourceKind::Grace => player.grace,
        ResourceKind::AuricCoin => player.auric_coin,
        ResourceKind::Experience => player.experience,
        ResourceKind::Energy => player.energy,
        ResourceKind::Stamina => player.stamina,
        ResourceKind::Hp => player.hp,
        ResourceKind::DropCharges => player.drop_charges,
    }
}

fn write_resource(player: &mut Player, kind: ResourceKind, value: i64) {
    match kind {
        ResourceKind::Lumees => player.lumees = value,
        ResourceKind::Grace => player.grace = value,
        ResourceKind::AuricCoin => player.auric_coin = value,
        ResourceKind::Experience => player.experience = value,
        ResourceKind::Energy => player.energy = value,
        ResourceKind::Stamina => player.stamina = value,
        ResourceKind::Hp => player.hp = value,
        ResourceKind::DropCharges => player.drop_charges = value,
    }
}

fn context_meta(context: Option<&str>) -> Option<Map<String, serde_json::Value>> {
    context.map(|c| {
        let mut meta = Map::new();
        meta.insert("caller_context".into(), json!(c));
        meta
    })
}
