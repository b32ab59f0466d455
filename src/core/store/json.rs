// src/core/store/json.rs

//! Client-side JSON layer over plain string storage.
//!
//! Documents are serialized JSON strings; paths are dot-notation with an
//! optional leading `$.` (`stats.hp`, `$.stats.hp`). These operations are
//! read-modify-write and therefore NOT atomic across concurrent writers to
//! the same key: callers that need atomic mutation of a document must hold a
//! distributed lock first.
//!
//! `json_set` replaces a non-container document (or intermediate node) with
//! an empty object before descending. That is irreversible data loss for the
//! previous value; callers relying on mixed-type documents must read before
//! writing.

use crate::core::errors::LumenError;
use crate::core::store::StoreService;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

/// Normalizes a dot path into its segments. `$`, `.` and the empty string
/// address the document root.
pub fn normalize_json_path(path: &str) -> Vec<String> {
    if path.is_empty() || path == "$" || path == "." {
        return Vec::new();
    }
    let normalized = path.trim_start_matches(['$', '.']);
    if normalized.is_empty() {
        return Vec::new();
    }
    normalized.split('.').map(str::to_string).collect()
}

/// Walks a document by path segments. Traversal across a non-container or
/// missing segment yields `None`, never an error.
pub fn json_path_get<'a>(doc: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = doc;
    for segment in segments {
        match node {
            Value::Object(map) => node = map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                node = items.get(index)?;
            }
            _ => return None,
        }
    }
    Some(node)
}

/// Sets `value` at the path, creating intermediate objects and growing arrays
/// as needed. A non-container node along the way is replaced with an empty
/// object (see the module docs for the data-loss caveat).
pub fn json_path_set(doc: &mut Value, segments: &[String], value: Value) {
    if segments.is_empty() {
        *doc = value;
        return;
    }

    let mut value = Some(value);
    let mut node: &mut Value = doc;
    for (i, segment) in segments.iter().enumerate() {
        let is_last = i == segments.len() - 1;

        // Arrays are only traversable with a numeric segment; any other
        // non-object node is re-rooted into an empty object.
        let as_array = node.is_array() && segment.parse::<usize>().is_ok();
        if !node.is_object() && !as_array {
            *node = Value::Object(Map::new());
        }

        node = match node {
            Value::Array(items) => {
                let index: usize = segment.parse().unwrap_or_default();
                while items.len() <= index {
                    items.push(json!({}));
                }
                if is_last {
                    items[index] = value.take().unwrap_or(Value::Null);
                    return;
                }
                if !items[index].is_object() && !items[index].is_array() {
                    items[index] = json!({});
                }
                &mut items[index]
            }
            Value::Object(map) => {
                if is_last {
                    map.insert(segment.clone(), value.take().unwrap_or(Value::Null));
                    return;
                }
                let needs_container = !matches!(
                    map.get(segment),
                    Some(Value::Object(_)) | Some(Value::Array(_))
                );
                if needs_container {
                    map.insert(segment.clone(), Value::Object(Map::new()));
                }
                // Present by construction.
                map.get_mut(segment).unwrap()
            }
            _ => return,
        };
    }
}

/// Deletes the value at the path. Returns whether anything was removed.
pub fn json_path_delete(doc: &mut Value, segments: &[String]) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut node: &mut Value = doc;
    for segment in parents {
        node = match node {
            Value::Object(map) => match map.get_mut(segment) {
                Some(next) => next,
                None => return false,
            },
            Value::Array(items) => {
                let Ok(index) = segment.parse::<usize>() else {
                    return false;
                };
                match items.get_mut(index) {
                    Some(next) => next,
                    None => return false,
                }
            }
            _ => return false,
        };
    }

    match node {
        Value::Object(map) => map.remove(last).is_some(),
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items.remove(index);
                true
            }
            _ => false,
        },
        _ => false,
    }
}

impl StoreService {
    /// Gets and deserializes a whole JSON document.
    pub async fn get_json(&self, key: &str) -> Result<Option<Value>, LumenError> {
        let Some(raw) = self.get(key).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key, error = %e, raw_len = raw.len(), "failed to deserialize JSON document");
                Ok(None)
            }
        }
    }

    /// Serializes and stores a whole JSON document.
    pub async fn set_json(
        &self,
        key: &str,
        value: &Value,
        ttl_secs: Option<u64>,
    ) -> Result<bool, LumenError> {
        let payload = serde_json::to_string(value)?;
        self.set(key, &payload, ttl_secs).await
    }

    /// Gets the value at a dot path inside a JSON document. Returns `None`
    /// when the key is absent, the document is not valid JSON, or the path
    /// does not resolve.
    pub async fn json_get(&self, key: &str, path: &str) -> Result<Option<Value>, LumenError> {
        let Some(doc) = self.get_json(key).await? else {
            return Ok(None);
        };
        let segments = normalize_json_path(path);
        if segments.is_empty() {
            return Ok(Some(doc));
        }
        let found = json_path_get(&doc, &segments).cloned();
        if found.is_none() {
            debug!(key, path, "JSON path did not resolve");
        }
        Ok(found)
    }

    /// Sets a value at a dot path, creating intermediate containers as
    /// needed. Root replacement when the path is `$` or empty. Not atomic
    /// across concurrent writers.
    pub async fn json_set(
        &self,
        key: &str,
        path: &str,
        value: Value,
        ttl_secs: Option<u64>,
    ) -> Result<bool, LumenError> {
        let segments = normalize_json_path(path);
        if segments.is_empty() {
            return self.set_json(key, &value, ttl_secs).await;
        }

        let mut doc = self.get_json(key).await?.unwrap_or_else(|| json!({}));
        json_path_set(&mut doc, &segments, value);
        self.set_json(key, &doc, ttl_secs).await
    }

    /// Deletes the value at a dot path. `$` or an empty path deletes the key.
    pub async fn json_delete(&self, key: &str, path: &str) -> Result<bool, LumenError> {
        let segments = normalize_json_path(path);
        if segments.is_empty() {
            return Ok(self.delete(key).await? > 0);
        }

        let Some(mut doc) = self.get_json(key).await? else {
            return Ok(false);
        };
        if !json_path_delete(&mut doc, &segments) {
            return Ok(false);
        }
        self.set_json(key, &doc, None).await?;
        Ok(true)
    }
}
