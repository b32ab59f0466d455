// src/core/audit/validator.rs

//! Schema validation for audit payloads.
//!
//! Every transaction type may register a detail schema; payloads are
//! sanitized and type-checked before emission so downstream consumers can
//! rely on a stable shape. Unknown transaction types are allowed or rejected
//! by a flag. All integer fields are normalized to signed 64-bit values.

use crate::core::errors::LumenError;
use parking_lot::RwLock;
use serde_json::{Map, Number, Value};
use std::collections::{BTreeMap, HashMap};

/// Longest context string kept on an audit event.
const MAX_CONTEXT_LEN: usize = 100;

/// Expected type of one detail field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Float,
    Bool,
    Str,
    Map,
    List,
    Any,
}

impl FieldType {
    fn name(self) -> &'static str {
        match self {
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::Bool => "bool",
            FieldType::Str => "string",
            FieldType::Map => "mapping",
            FieldType::List => "list",
            FieldType::Any => "any",
        }
    }
}

/// Declared shape of one transaction type's `details` mapping. Fields not
/// declared pass through untouched.
#[derive(Debug, Clone, Default)]
pub struct DetailSchema {
    fields: BTreeMap<String, (FieldType, bool)>,
}

impl DetailSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), (ty, true));
        self
    }

    pub fn optional(mut self, name: &str, ty: FieldType) -> Self {
        self.fields.insert(name.to_string(), (ty, false));
        self
    }

    /// Validates and sanitizes a details mapping against this schema.
    fn validate(
        &self,
        transaction_type: &str,
        mut details: Map<String, Value>,
    ) -> Result<Map<String, Value>, LumenError> {
        for (field, (ty, required)) in &self.fields {
            match details.get(field) {
                None if *required => {
                    return Err(LumenError::AuditValidation(format!(
                        "transaction '{transaction_type}' is missing required detail '{field}'"
                    )));
                }
                None => {}
                Some(value) => {
                    let sanitized = sanitize_field(transaction_type, field, *ty, value)?;
                    details.insert(field.clone(), sanitized);
                }
            }
        }
        Ok(details)
    }
}

fn sanitize_field(
    transaction_type: &str,
    field: &str,
    ty: FieldType,
    value: &Value,
) -> Result<Value, LumenError> {
    let mismatch = || {
        LumenError::AuditValidation(format!(
            "transaction '{transaction_type}' detail '{field}' must be {}",
            ty.name()
        ))
    };

    match ty {
        FieldType::Any => Ok(value.clone()),
        FieldType::Bool => value.is_boolean().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Str => value.is_string().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Map => value.is_object().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::List => value.is_array().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Float => value.is_number().then(|| value.clone()).ok_or_else(mismatch),
        FieldType::Int => {
            // Integer deltas are always carried as signed 64-bit values.
            let normalized = value
                .as_i64()
                .or_else(|| value.as_u64().and_then(|u| i64::try_from(u).ok()))
                .ok_or_else(mismatch)?;
            Ok(Value::Number(Number::from(normalized)))
        }
    }
}

/// Registry of per-transaction-type detail schemas.
pub struct TransactionValidator {
    exact: RwLock<HashMap<String, DetailSchema>>,
    prefixes: RwLock<Vec<(String, DetailSchema)>>,
    allow_unknown_types: bool,
}

impl TransactionValidator {
    pub fn new(allow_unknown_types: bool) -> Self {
        let validator = Self {
            exact: RwLock::new(HashMap::new()),
            prefixes: RwLock::new(Vec::new()),
            allow_unknown_types,
        };
        validator.register_builtins();
        validator
    }

    fn register_builtins(&self) {
        self.register(
            "fusion_attempt",
            DetailSchema::new()
                .required("success", FieldType::Bool)
                .required("tier", FieldType::Int)
                .optional("cost", FieldType::Int)
                .optional("result_tier", FieldType::Int),
        );
        self.register(
            "level_up",
            DetailSchema::new()
                .required("old_level", FieldType::Int)
                .required("new_level", FieldType::Int),
        );
        self.register(
            "reward_claim",
            DetailSchema::new()
                .required("claim_type", FieldType::Str)
                .required("claim_key", FieldType::Str),
        );
        self.register_prefix(
            "resource_change_",
            DetailSchema::new()
                .required("old_value", FieldType::Int)
                .required("new_value", FieldType::Int)
                .required("delta", FieldType::Int)
                .optional("resource_type", FieldType::Str)
                .optional("reason", FieldType::Str),
        );
        self.register_prefix(
            "resource_grant_",
            DetailSchema::new()
                .required("resources_granted", FieldType::Map)
                .optional("base_amounts", FieldType::Map)
                .optional("modifiers", FieldType::Map)
                .optional("caps_hit", FieldType::List)
                .optional("old_values", FieldType::Map)
                .optional("new_values", FieldType::Map)
                .optional("source", FieldType::Str),
        );
        self.register_prefix(
            "resource_consume_",
            DetailSchema::new()
                .required("resources_consumed", FieldType::Map)
                .optional("old_values", FieldType::Map)
                .optional("new_values", FieldType::Map)
                .optional("source", FieldType::Str),
        );
        self.register_prefix(
            "maiden_",
            DetailSchema::new()
                .required("action", FieldType::Str)
                .optional("maiden_id", FieldType::Int)
                .optional("maiden_name", FieldType::Str)
                .optional("tier", FieldType::Int)
                .optional("quantity_change", FieldType::Int),
        );
    }

    /// Registers (or replaces) the schema for an exact transaction type.
    pub fn register(&self, transaction_type: &str, schema: DetailSchema) {
        self.exact
            .write()
            .insert(transaction_type.to_string(), schema);
    }

    /// Registers a schema matching every transaction type with a prefix,
    /// e.g. `resource_change_` for `resource_change_lumees`.
    pub fn register_prefix(&self, prefix: &str, schema: DetailSchema) {
        self.prefixes.write().push((prefix.to_string(), schema));
    }

    /// Validates and sanitizes a transaction payload.
    ///
    /// # Errors
    ///
    /// `AuditValidation` when the type is unknown (and unknown types are
    /// rejected) or a detail fails its schema.
    pub fn validate_transaction(
        &self,
        transaction_type: &str,
        details: Map<String, Value>,
    ) -> Result<Map<String, Value>, LumenError> {
        if let Some(schema) = self.exact.read().get(transaction_type) {
            return schema.validate(transaction_type, details);
        }

        let prefixes = self.prefixes.read();
        if let Some((_, schema)) = prefixes
            .iter()
            .find(|(prefix, _)| transaction_type.starts_with(prefix))
        {
            return schema.validate(transaction_type, details);
        }

        if self.allow_unknown_types {
            Ok(details)
        } else {
            Err(LumenError::AuditValidation(format!(
                "unknown transaction type '{transaction_type}'"
            )))
        }
    }

    /// Normalizes the context string: trimmed, capped, "unknown" when absent.
    pub fn validate_context(&self, context: Option<&str>) -> String {
        let trimmed = context.map(str::trim).unwrap_or("");
        if trimmed.is_empty() {
            return "unknown".to_string();
        }
        trimmed.chars().take(MAX_CONTEXT_LEN).collect()
    }
}
