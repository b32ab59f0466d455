use lumen::LumenError;
use lumen::config::GameSettings;
use lumen::core::audit::{AUDIT_TOPIC, AuditLogger};
use lumen::core::config::ConfigManager;
use lumen::core::db::Player;
use lumen::core::events::EventBus;
use lumen::core::resource::{
    ModifierProvider, Modifiers, ResourceKind, ResourceService,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

struct FixedModifiers(Modifiers);

impl ModifierProvider for FixedModifiers {
    fn active_modifiers(&self, _player: &Player) -> Modifiers {
        self.0
    }
}

struct Fixture {
    service: ResourceService,
    events: Arc<parking_lot::Mutex<Vec<Value>>>,
    game: GameSettings,
}

fn fixture(income_boost: f64, xp_boost: f64) -> Fixture {
    let bus = Arc::new(EventBus::new());
    let events = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe_fn(AUDIT_TOPIC, "capture", move |event| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(event.payload);
            Ok(())
        }
    });

    let audit = Arc::new(AuditLogger::new(bus, true));
    let config = Arc::new(ConfigManager::new("no-such-config-dir", 300));
    let game = GameSettings::default();
    let service = ResourceService::new(
        audit,
        config,
        game,
        Arc::new(FixedModifiers(Modifiers {
            income_boost,
            xp_boost,
        })),
    );
    Fixture {
        service,
        events,
        game,
    }
}

fn amounts(pairs: &[(ResourceKind, i64)]) -> BTreeMap<ResourceKind, i64> {
    pairs.iter().copied().collect()
}

#[tokio::test]
async fn test_grant_with_income_modifier() {
    let fx = fixture(1.2, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.leader_maiden_id = Some(10);

    let outcome = fx
        .service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Lumees, 100)]),
            "daily",
            true,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.lumees, 1120);
    assert_eq!(outcome.granted[&ResourceKind::Lumees], 120);
    assert!((outcome.modifiers_applied.income_boost - 1.2).abs() < f64::EPSILON);
    assert!(outcome.caps_hit.is_empty());

    let events = fx.events.lock();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["transaction_type"], "resource_grant_daily");
    assert_eq!(event["details"]["resources_granted"]["lumees"], 120);
    assert_eq!(event["details"]["old_values"]["lumees"], 1000);
    assert_eq!(event["details"]["new_values"]["lumees"], 1120);
}

#[tokio::test]
async fn test_grant_without_modifiers_credits_exact_base() {
    let fx = fixture(1.5, 1.5);
    let mut player = Player::fresh(1, &fx.game);
    player.leader_maiden_id = Some(10);

    let outcome = fx
        .service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Lumees, 100)]),
            "tutorial",
            false,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.lumees, 1100);
    assert_eq!(outcome.granted[&ResourceKind::Lumees], 100);
    assert!((outcome.modifiers_applied.income_boost - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_no_leader_means_neutral_modifiers() {
    let fx = fixture(2.0, 2.0);
    let mut player = Player::fresh(1, &fx.game);
    // leader_maiden_id stays None; the provider must not be consulted.

    fx.service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Lumees, 100)]),
            "daily",
            true,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.lumees, 1100);
}

#[tokio::test]
async fn test_grace_saturates_at_cap() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.grace = 999_990;

    let outcome = fx
        .service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Grace, 100)]),
            "shrine",
            false,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.grace, 999_999);
    assert_eq!(outcome.granted[&ResourceKind::Grace], 9);
    assert_eq!(outcome.caps_hit, vec![ResourceKind::Grace]);

    let events = fx.events.lock();
    assert_eq!(events[0]["details"]["caps_hit"][0], "grace");
}

#[tokio::test]
async fn test_consumables_saturate_at_player_max() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.energy = 95;

    let outcome = fx
        .service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Energy, 50)]),
            "regen",
            false,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.energy, 100);
    assert_eq!(outcome.granted[&ResourceKind::Energy], 5);
    // Consumable saturation is not a caps_hit; that is reserved for the
    // capped currency.
    assert!(outcome.caps_hit.is_empty());
}

#[tokio::test]
async fn test_drop_charges_cap_at_one() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.drop_charges = 0;

    fx.service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::DropCharges, 5)]),
            "regen",
            false,
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.drop_charges, 1);
}

#[tokio::test]
async fn test_xp_boost_applies_to_experience_only() {
    let fx = fixture(1.0, 1.5);
    let mut player = Player::fresh(1, &fx.game);
    player.leader_maiden_id = Some(10);

    let outcome = fx
        .service
        .grant(
            &mut player,
            &amounts(&[(ResourceKind::Experience, 101), (ResourceKind::Lumees, 100)]),
            "quest",
            true,
            None,
        )
        .await
        .unwrap();

    // floor(101 * 1.5) = 151
    assert_eq!(player.experience, 151);
    assert_eq!(outcome.granted[&ResourceKind::Experience], 151);
    assert_eq!(outcome.granted[&ResourceKind::Lumees], 100);
}

#[tokio::test]
async fn test_consume_with_insufficient_resources_mutates_nothing() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.lumees = 50;
    player.energy = 100;

    let result = fx
        .service
        .consume(
            &mut player,
            &amounts(&[(ResourceKind::Lumees, 100), (ResourceKind::Energy, 10)]),
            "fusion_cost",
            None,
        )
        .await;

    match result {
        Err(LumenError::InsufficientResources {
            resource,
            required,
            current,
        }) => {
            assert_eq!(resource, "lumees");
            assert_eq!(required, 100);
            assert_eq!(current, 50);
        }
        other => panic!("expected InsufficientResources, got {other:?}"),
    }

    // Nothing changed and no audit event was emitted.
    assert_eq!(player.lumees, 50);
    assert_eq!(player.energy, 100);
    assert!(fx.events.lock().is_empty());
}

#[tokio::test]
async fn test_consume_debits_all_resources() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.lumees = 5000;

    let outcome = fx
        .service
        .consume(
            &mut player,
            &amounts(&[(ResourceKind::Lumees, 2500), (ResourceKind::Energy, 10)]),
            "fusion_cost",
            None,
        )
        .await
        .unwrap();

    assert_eq!(player.lumees, 2500);
    assert_eq!(player.energy, 90);
    assert_eq!(outcome.consumed[&ResourceKind::Lumees], 2500);

    let events = fx.events.lock();
    assert_eq!(events[0]["transaction_type"], "resource_consume_fusion_cost");
}

#[tokio::test]
async fn test_check_is_read_only() {
    let fx = fixture(1.0, 1.0);
    let player = Player::fresh(1, &fx.game);

    assert!(fx.service.check(&player, &amounts(&[(ResourceKind::Lumees, 1000)])));
    assert!(!fx.service.check(&player, &amounts(&[(ResourceKind::Lumees, 1001)])));
    assert!(fx.events.lock().is_empty());
}

#[tokio::test]
async fn test_apply_regeneration_respects_caps() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);
    player.energy = 90;
    player.stamina = 50;

    let actual = fx.service.apply_regeneration(
        &mut player,
        &amounts(&[(ResourceKind::Energy, 20), (ResourceKind::Stamina, 5)]),
    );

    assert_eq!(player.energy, 100);
    assert_eq!(actual[&ResourceKind::Energy], 10);
    // Already at max; nothing regenerated.
    assert_eq!(actual[&ResourceKind::Stamina], 0);
}

#[tokio::test]
async fn test_metrics_track_operations() {
    let fx = fixture(1.0, 1.0);
    let mut player = Player::fresh(1, &fx.game);

    fx.service
        .grant(&mut player, &amounts(&[(ResourceKind::Lumees, 10)]), "t", false, None)
        .await
        .unwrap();
    let _ = fx
        .service
        .consume(&mut player, &amounts(&[(ResourceKind::Lumees, 1_000_000)]), "t", None)
        .await;
    fx.service.check(&player, &amounts(&[(ResourceKind::Lumees, 1)]));

    let summary = fx.service.metrics().summary();
    assert_eq!(summary.grants, 1);
    assert_eq!(summary.consumes, 1);
    assert_eq!(summary.checks, 1);
    assert_eq!(summary.insufficient_errors, 1);
    assert_eq!(summary.lumees_granted, 10);
}
