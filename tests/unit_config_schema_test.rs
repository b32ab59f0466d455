use lumen::LumenError;
use lumen::core::config::{ConfigSchema, SchemaField};
use serde_json::json;

#[test]
fn test_valid_flat_config_passes() {
    let schema = ConfigSchema::new()
        .field("count", SchemaField::Int)
        .field("rate", SchemaField::Float)
        .field("label", SchemaField::Str)
        .field("enabled", SchemaField::Bool);

    let value = json!({"count": 10, "rate": 0.5, "label": "x", "enabled": true});
    assert!(schema.validate(&value, "").is_ok());
}

#[test]
fn test_int_accepted_where_float_expected() {
    let schema = ConfigSchema::new().field("rate", SchemaField::Float);
    assert!(schema.validate(&json!({"rate": 2}), "").is_ok());
}

#[test]
fn test_float_rejected_where_int_expected() {
    let schema = ConfigSchema::new().field("count", SchemaField::Int);
    let err = schema.validate(&json!({"count": 1.5}), "").unwrap_err();
    assert!(matches!(err, LumenError::ConfigValidation(_)));
}

#[test]
fn test_type_mismatch_names_dotted_path() {
    let schema = ConfigSchema::new().field(
        "costs",
        SchemaField::Nested(ConfigSchema::new().field("base", SchemaField::Int)),
    );
    let err = schema
        .validate(&json!({"costs": {"base": "not_an_int"}}), "fusion_costs")
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("fusion_costs.costs.base"), "got: {message}");
}

#[test]
fn test_missing_fields_are_allowed() {
    let schema = ConfigSchema::new()
        .field("base", SchemaField::Int)
        .field("multiplier", SchemaField::Float);
    assert!(schema.validate(&json!({"base": 100}), "").is_ok());
}

#[test]
fn test_unknown_fields_allowed_by_default() {
    let schema = ConfigSchema::new().field("base", SchemaField::Int);
    assert!(schema.validate(&json!({"base": 1, "extra": true}), "").is_ok());
}

#[test]
fn test_deny_extra_rejects_unknown_fields() {
    let schema = ConfigSchema::new()
        .field("base", SchemaField::Int)
        .deny_extra();
    let err = schema
        .validate(&json!({"base": 1, "extra": true}), "")
        .unwrap_err();
    assert!(err.to_string().contains("extra"));
}

#[test]
fn test_non_mapping_value_rejected() {
    let schema = ConfigSchema::new().field("base", SchemaField::Int);
    let err = schema.validate(&json!([1, 2, 3]), "").unwrap_err();
    assert!(err.to_string().contains("<root>"));
}

#[test]
fn test_nested_schema_recurses() {
    let schema = ConfigSchema::new().field(
        "ttl",
        SchemaField::Nested(
            ConfigSchema::new()
                .field("player_resources", SchemaField::Int)
                .field("fusion_rates", SchemaField::Int),
        ),
    );
    let ok = json!({"ttl": {"player_resources": 300, "fusion_rates": 3600}});
    assert!(schema.validate(&ok, "cache").is_ok());

    let bad = json!({"ttl": "everything"});
    let err = schema.validate(&bad, "cache").unwrap_err();
    assert!(err.to_string().contains("cache.ttl"));
}
