// src/core/config/schema.rs

//! Recursive schema validation for dynamic configuration subtrees.
//!
//! A schema maps field names to either a primitive type or a nested schema.
//! Missing fields are allowed (sparse configs); unknown fields are allowed
//! unless `allow_extra` is off; an integer is accepted where a float is
//! expected. The first mismatch fails with a `ConfigValidation` error naming
//! the dotted path.

use crate::core::errors::LumenError;
use serde_json::Value;
use std::collections::BTreeMap;

/// The expected shape of one schema field.
#[derive(Debug, Clone)]
pub enum SchemaField {
    Bool,
    Int,
    Float,
    Str,
    Nested(ConfigSchema),
}

impl SchemaField {
    fn type_name(&self) -> &'static str {
        match self {
            SchemaField::Bool => "bool",
            SchemaField::Int => "int",
            SchemaField::Float => "float",
            SchemaField::Str => "string",
            SchemaField::Nested(_) => "mapping",
        }
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Recursive schema for nested configuration validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigSchema {
    fields: BTreeMap<String, SchemaField>,
    allow_extra: bool,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
            allow_extra: true,
        }
    }

    pub fn field(mut self, name: &str, expected: SchemaField) -> Self {
        self.fields.insert(name.to_string(), expected);
        self
    }

    pub fn deny_extra(mut self) -> Self {
        self.allow_extra = false;
        self
    }

    /// Validates a subtree against this schema.
    ///
    /// # Errors
    ///
    /// `ConfigValidation` with a dotted path on the first mismatch.
    pub fn validate(&self, value: &Value, path: &str) -> Result<(), LumenError> {
        let Value::Object(map) = value else {
            return Err(LumenError::ConfigValidation(format!(
                "config value at '{}' must be a mapping; got {}",
                display_path(path),
                value_type_name(value)
            )));
        };

        for (key, expected) in &self.fields {
            let full_path = join_path(path, key);
            let Some(raw) = map.get(key) else {
                // Missing fields are allowed (sparse configs).
                continue;
            };

            match expected {
                SchemaField::Nested(nested) => nested.validate(raw, &full_path)?,
                SchemaField::Bool if raw.is_boolean() => {}
                SchemaField::Int if raw.as_i64().is_some() || raw.as_u64().is_some() => {}
                // An int is accepted where a float is expected.
                SchemaField::Float if raw.is_number() => {}
                SchemaField::Str if raw.is_string() => {}
                _ => {
                    return Err(LumenError::ConfigValidation(format!(
                        "config value at '{}' must be {}; got {}",
                        full_path,
                        expected.type_name(),
                        value_type_name(raw)
                    )));
                }
            }
        }

        if !self.allow_extra {
            let unknown: Vec<&str> = map
                .keys()
                .filter(|k| !self.fields.contains_key(*k))
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(LumenError::ConfigValidation(format!(
                    "unexpected config keys at '{}': {}",
                    display_path(path),
                    unknown.join(", ")
                )));
            }
        }

        Ok(())
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "<root>" } else { path }
}

fn join_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Schemas registered at startup for the well-understood top-level keys.
/// Unregistered keys bypass validation.
pub fn builtin_schemas() -> Vec<(String, ConfigSchema)> {
    vec![
        (
            "resource_system".to_string(),
            ConfigSchema::new()
                .field("grace_max_cap", SchemaField::Int)
                .field("auric_coin_max_cap", SchemaField::Int),
        ),
        (
            "fusion_costs".to_string(),
            ConfigSchema::new()
                .field("base", SchemaField::Int)
                .field("multiplier", SchemaField::Float),
        ),
        (
            "drop_system".to_string(),
            ConfigSchema::new().field("regen_minutes", SchemaField::Int),
        ),
        (
            "leader_bonuses".to_string(),
            ConfigSchema::new()
                .field("income_boost", SchemaField::Float)
                .field("xp_boost", SchemaField::Float),
        ),
        (
            "cache".to_string(),
            ConfigSchema::new()
                .field("tag_registry_ttl", SchemaField::Int)
                .field(
                    "ttl",
                    SchemaField::Nested(
                        ConfigSchema::new()
                            .field("player_resources", SchemaField::Int)
                            .field("active_modifiers", SchemaField::Int)
                            .field("maiden_collection", SchemaField::Int)
                            .field("fusion_rates", SchemaField::Int)
                            .field("leader_bonuses", SchemaField::Int)
                            .field("daily_quest", SchemaField::Int)
                            .field("drop_charges", SchemaField::Int)
                            .field("leaderboards", SchemaField::Int),
                    ),
                )
                .field(
                    "health",
                    SchemaField::Nested(
                        ConfigSchema::new()
                            .field("max_errors", SchemaField::Int)
                            .field("min_hit_rate", SchemaField::Float),
                    ),
                ),
        ),
    ]
}
