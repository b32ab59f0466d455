use lumen::config::GameSettings;
use lumen::core::db::Player;

#[test]
fn test_fresh_player_defaults() {
    let game = GameSettings::default();
    let player = Player::fresh(42, &game);
    assert_eq!(player.discord_id, 42);
    assert_eq!(player.level, 1);
    assert_eq!(player.lumees, 1000);
    assert_eq!(player.grace, 0);
    assert_eq!(player.energy, 100);
    assert_eq!(player.max_stamina, 50);
    assert_eq!(player.drop_charges, 0);
    assert!(player.class().is_none());
}

#[test]
fn test_max_stats_scale_with_allocation() {
    let game = GameSettings::default();
    let mut player = Player::fresh(1, &game);
    player.stat_points_spent.insert("energy".to_string(), 5);
    player.stat_points_spent.insert("stamina".to_string(), 10);
    player.stat_points_spent.insert("hp".to_string(), 2);

    let max = player.calculate_max_stats(&game);
    assert_eq!(max.energy, 150);
    assert_eq!(max.stamina, 100);
    assert_eq!(max.hp, 700);
    assert_eq!(player.total_stat_points_spent(), 17);
}

#[test]
fn test_level_up_refreshes_resources_and_grants_points() {
    let game = GameSettings::default();
    let mut player = Player::fresh(1, &game);
    player.stat_points_spent.insert("energy".to_string(), 2);
    player.energy = 10;
    player.stamina = 0;
    player.drop_charges = 0;

    player.refresh_on_level_up(&game);

    assert_eq!(player.max_energy, 120);
    assert_eq!(player.energy, 120);
    assert_eq!(player.stamina, 50);
    assert_eq!(player.hp, 500);
    assert_eq!(player.drop_charges, 1);
    assert_eq!(player.stat_points_available, 5);
    assert!(player.last_level_up.is_some());
    assert_eq!(player.stats.get("level_ups"), Some(&1));
}

#[test]
fn test_class_parsing() {
    let game = GameSettings::default();
    let mut player = Player::fresh(1, &game);
    player.player_class = Some("invoker".to_string());
    assert_eq!(player.class().map(|c| c.to_string()), Some("invoker".to_string()));

    player.player_class = Some("warlock".to_string());
    assert!(player.class().is_none());
}

#[test]
fn test_fusion_shards_lookup() {
    let game = GameSettings::default();
    let mut player = Player::fresh(1, &game);
    player.fusion_shards.insert("tier_3".to_string(), 7);
    assert_eq!(player.fusion_shards_for_tier(3), 7);
    assert_eq!(player.fusion_shards_for_tier(4), 0);
}

#[test]
fn test_drop_regen_countdown() {
    let game = GameSettings::default();
    let mut player = Player::fresh(1, &game);

    // At the single-charge cap: nothing to wait for.
    player.drop_charges = 1;
    assert_eq!(player.drop_regen_seconds_remaining(&game), 0);

    // Below the cap with a recent regen stamp: counting down.
    player.drop_charges = 0;
    player.last_drop_regen = Some(chrono::Utc::now());
    let remaining = player.drop_regen_seconds_remaining(&game);
    assert!(remaining > 0 && remaining <= game.drop_regen_minutes * 60);
}
