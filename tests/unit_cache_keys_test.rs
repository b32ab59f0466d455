use lumen::core::cache::keys::{
    CacheKey, CacheKind, cache_key_from_marker, player_tag, tag_marker_key, tag_pattern,
};

#[test]
fn test_player_scoped_key_templates() {
    assert_eq!(
        CacheKey::PlayerResources { player_id: 123 }.render(),
        "lumen:v2:player:123:resources"
    );
    assert_eq!(
        CacheKey::MaidenCollection { player_id: 123 }.render(),
        "lumen:v2:player:123:maidens"
    );
    assert_eq!(
        CacheKey::ActiveModifiers { player_id: 123 }.render(),
        "lumen:v2:modifiers:123"
    );
    assert_eq!(
        CacheKey::DropCharges { player_id: 123 }.render(),
        "lumen:v2:drop:123"
    );
}

#[test]
fn test_global_key_templates() {
    assert_eq!(
        CacheKey::FusionRates { tier: 4 }.render(),
        "lumen:v2:fusion:rates:4"
    );
    assert_eq!(
        CacheKey::LeaderBonuses { base_id: 7, tier: 3 }.render(),
        "lumen:v2:leader:7:3"
    );
    assert_eq!(
        CacheKey::DailyQuest {
            player_id: 9,
            date: "2025-01-15".to_string()
        }
        .render(),
        "lumen:v2:daily:9:2025-01-15"
    );
    assert_eq!(
        CacheKey::Leaderboards {
            kind: "power".to_string(),
            period: "weekly".to_string()
        }
        .render(),
        "lumen:v2:leaderboard:power:weekly"
    );
}

#[test]
fn test_kind_mapping() {
    assert_eq!(
        CacheKey::PlayerResources { player_id: 1 }.kind(),
        CacheKind::PlayerResources
    );
    assert_eq!(CacheKey::FusionRates { tier: 1 }.kind(), CacheKind::FusionRates);
}

#[test]
fn test_ttl_defaults_by_tier() {
    assert_eq!(CacheKind::PlayerResources.default_ttl_secs(), 300);
    assert_eq!(CacheKind::ActiveModifiers.default_ttl_secs(), 600);
    assert_eq!(CacheKind::FusionRates.default_ttl_secs(), 3600);
    assert_eq!(CacheKind::DailyQuest.default_ttl_secs(), 86400);
}

#[test]
fn test_ttl_config_paths() {
    assert_eq!(
        CacheKind::PlayerResources.ttl_config_path(),
        "cache.ttl.player_resources"
    );
    assert_eq!(
        CacheKind::LeaderBonuses.ttl_config_path(),
        "cache.ttl.leader_bonuses"
    );
}

#[test]
fn test_tag_marker_round_trip() {
    let cache_key = CacheKey::PlayerResources { player_id: 42 }.render();
    let tag = player_tag(42);
    let marker = tag_marker_key(&tag, &cache_key);

    assert_eq!(marker, "lumen:v2:cache:tag:player:42:lumen:v2:player:42:resources");
    assert_eq!(cache_key_from_marker(&marker, &tag), Some(cache_key.as_str()));
}

#[test]
fn test_tag_pattern() {
    assert_eq!(tag_pattern("resources"), "lumen:v2:cache:tag:resources:*");
}

#[test]
fn test_marker_with_wrong_tag_does_not_extract() {
    let marker = tag_marker_key("resources", "lumen:v2:player:1:resources");
    assert_eq!(cache_key_from_marker(&marker, "maiden"), None);
}
