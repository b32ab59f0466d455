use lumen::core::store::json::{
    json_path_delete, json_path_get, json_path_set, normalize_json_path,
};
use serde_json::json;

#[test]
fn test_normalize_root_paths() {
    assert!(normalize_json_path("").is_empty());
    assert!(normalize_json_path("$").is_empty());
    assert!(normalize_json_path(".").is_empty());
    assert!(normalize_json_path("$.").is_empty());
}

#[test]
fn test_normalize_dotted_paths() {
    assert_eq!(normalize_json_path("stats.hp"), vec!["stats", "hp"]);
    assert_eq!(normalize_json_path("$.stats.hp"), vec!["stats", "hp"]);
    assert_eq!(normalize_json_path("a"), vec!["a"]);
}

#[test]
fn test_get_nested_value() {
    let doc = json!({"stats": {"hp": 500, "energy": 100}});
    let segments = normalize_json_path("stats.hp");
    assert_eq!(json_path_get(&doc, &segments), Some(&json!(500)));
}

#[test]
fn test_get_array_index() {
    let doc = json!({"tiers": [10, 20, 30]});
    let segments = normalize_json_path("tiers.1");
    assert_eq!(json_path_get(&doc, &segments), Some(&json!(20)));
}

#[test]
fn test_get_across_non_container_returns_none() {
    let doc = json!({"stats": 5});
    let segments = normalize_json_path("stats.hp");
    assert_eq!(json_path_get(&doc, &segments), None);
}

#[test]
fn test_get_missing_segment_returns_none() {
    let doc = json!({"stats": {"hp": 500}});
    let segments = normalize_json_path("stats.mp");
    assert_eq!(json_path_get(&doc, &segments), None);
}

#[test]
fn test_set_then_get_round_trip() {
    let mut doc = json!({});
    let segments = normalize_json_path("stats.hp");
    json_path_set(&mut doc, &segments, json!(750));
    assert_eq!(json_path_get(&doc, &segments), Some(&json!(750)));
}

#[test]
fn test_set_creates_intermediate_objects() {
    let mut doc = json!({});
    let segments = normalize_json_path("a.b.c");
    json_path_set(&mut doc, &segments, json!("deep"));
    assert_eq!(doc, json!({"a": {"b": {"c": "deep"}}}));
}

#[test]
fn test_set_root_replacement() {
    let mut doc = json!({"old": 1});
    json_path_set(&mut doc, &[], json!({"new": 2}));
    assert_eq!(doc, json!({"new": 2}));
}

#[test]
fn test_set_preserves_sibling_fields() {
    let mut doc = json!({"stats": {"hp": 500, "energy": 100}});
    let segments = normalize_json_path("stats.hp");
    json_path_set(&mut doc, &segments, json!(400));
    assert_eq!(doc, json!({"stats": {"hp": 400, "energy": 100}}));
}

#[test]
fn test_set_grows_arrays_with_empty_objects() {
    let mut doc = json!({"tiers": [1]});
    let segments = normalize_json_path("tiers.3");
    json_path_set(&mut doc, &segments, json!(99));
    assert_eq!(doc, json!({"tiers": [1, {}, {}, 99]}));
}

#[test]
fn test_set_reroots_non_container_intermediate() {
    // A scalar in the way is silently replaced with an object; this is the
    // documented data-loss hazard of the write path.
    let mut doc = json!({"stats": 5});
    let segments = normalize_json_path("stats.hp");
    json_path_set(&mut doc, &segments, json!(500));
    assert_eq!(doc, json!({"stats": {"hp": 500}}));
}

#[test]
fn test_delete_field() {
    let mut doc = json!({"stats": {"hp": 500, "energy": 100}});
    let segments = normalize_json_path("stats.hp");
    assert!(json_path_delete(&mut doc, &segments));
    assert_eq!(doc, json!({"stats": {"energy": 100}}));
}

#[test]
fn test_delete_array_element() {
    let mut doc = json!({"tiers": [10, 20, 30]});
    let segments = normalize_json_path("tiers.1");
    assert!(json_path_delete(&mut doc, &segments));
    assert_eq!(doc, json!({"tiers": [10, 30]}));
}

#[test]
fn test_delete_missing_returns_false() {
    let mut doc = json!({"stats": {"hp": 500}});
    assert!(!json_path_delete(&mut doc, &normalize_json_path("stats.mp")));
    assert!(!json_path_delete(&mut doc, &normalize_json_path("other.hp")));
    assert_eq!(doc, json!({"stats": {"hp": 500}}));
}
