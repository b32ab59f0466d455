// src/core/config/mod.rs

//! Dynamic game configuration: file-sourced defaults, database overrides,
//! validated writes, and hot reload.
//!
//! Load order: every YAML file under the configured directory is merged into
//! an in-memory map (later files override earlier at top-level keys), the
//! merged map is snapshotted as the defaults, then `game_config` rows are
//! overlaid on top — the database always wins. A background task re-reads the
//! database on a timer; `set` writes through the database transactionally and
//! updates the map immediately.

pub mod metrics;
pub mod schema;

use crate::core::db::DatabaseService;
use crate::core::errors::LumenError;
use crate::core::metrics as prom;
use crate::core::store::json::{json_path_set, normalize_json_path};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, warn};

pub use metrics::{ConfigHealth, ConfigMetrics, ConfigMetricsSummary};
pub use schema::{ConfigSchema, SchemaField, builtin_schemas};

/// Hierarchical, hot-reloadable configuration store.
pub struct ConfigManager {
    cache: RwLock<Map<String, Value>>,
    defaults: RwLock<Map<String, Value>>,
    schemas: RwLock<HashMap<String, ConfigSchema>>,
    timestamps: RwLock<HashMap<String, DateTime<Utc>>>,
    metrics: ConfigMetrics,
    initialized: AtomicBool,
    refresh_running: AtomicBool,
    config_dir: PathBuf,
    refresh_secs: u64,
}

impl ConfigManager {
    pub fn new(config_dir: impl Into<PathBuf>, refresh_secs: u64) -> Self {
        let manager = Self {
            cache: RwLock::new(Map::new()),
            defaults: RwLock::new(Map::new()),
            schemas: RwLock::new(HashMap::new()),
            timestamps: RwLock::new(HashMap::new()),
            metrics: ConfigMetrics::new(),
            initialized: AtomicBool::new(false),
            refresh_running: AtomicBool::new(false),
            config_dir: config_dir.into(),
            refresh_secs,
        };
        for (key, schema) in builtin_schemas() {
            manager.register_schema(&key, schema);
        }
        manager
    }

    // ------------------------------------------------------------------
    // Initialization / refresh
    // ------------------------------------------------------------------

    /// Loads YAML defaults, overlays database rows, and marks the manager
    /// initialized.
    ///
    /// # Errors
    ///
    /// `ConfigInitialization` when the database overlay fails. YAML defaults
    /// already loaded at that point remain usable, so callers may choose to
    /// continue degraded.
    pub async fn initialize(&self, db: &DatabaseService) -> Result<(), LumenError> {
        let yaml_count = self.load_yaml_defaults()?;

        match self.refresh(db).await {
            Ok(db_count) => {
                self.initialized.store(true, Ordering::SeqCst);
                info!(
                    yaml_files = yaml_count,
                    db_rows = db_count,
                    top_level_keys = self.cache.read().len(),
                    "config manager initialized"
                );
                Ok(())
            }
            Err(e) => {
                self.metrics.record_error();
                // Defaults keep the process alive; the error still surfaces.
                self.initialized.store(true, Ordering::SeqCst);
                error!(error = %e, "config manager database overlay failed, running on file defaults");
                Err(LumenError::ConfigInitialization(format!(
                    "failed to load game_config overlay: {e}"
                )))
            }
        }
    }

    /// Recursively loads every `*.yaml` / `*.yml` under the config directory,
    /// merging top-level keys (later files override earlier) into both the
    /// defaults snapshot and the live map. Returns the number of files loaded.
    pub fn load_yaml_defaults(&self) -> Result<usize, LumenError> {
        if !self.config_dir.exists() {
            warn!(dir = %self.config_dir.display(), "config directory not found, skipping YAML defaults");
            return Ok(0);
        }

        let mut files = Vec::new();
        collect_yaml_files(&self.config_dir, &mut files)?;
        files.sort();

        let mut merged = Map::new();
        let mut loaded = 0usize;
        for file in &files {
            match load_yaml_file(file) {
                Ok(Some(map)) => {
                    for (key, value) in map {
                        merged.insert(key, value);
                    }
                    loaded += 1;
                    debug!(file = %file.display(), "loaded YAML config file");
                }
                Ok(None) => {}
                Err(e) => {
                    self.metrics.record_error();
                    warn!(file = %file.display(), error = %e, "failed to load YAML config file");
                }
            }
        }

        *self.defaults.write() = merged.clone();
        {
            let mut cache = self.cache.write();
            for (key, value) in merged {
                cache.entry(key).or_insert(value);
            }
        }

        info!(
            yaml_files = loaded,
            keys = self.defaults.read().len(),
            "YAML config defaults loaded"
        );
        Ok(loaded)
    }

    /// Initializes from YAML files alone, without a database overlay. Used by
    /// offline tooling and tests; the server always overlays `game_config`.
    pub fn initialize_defaults_only(&self) -> Result<usize, LumenError> {
        let loaded = self.load_yaml_defaults()?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(loaded)
    }

    /// Re-reads `game_config` and overlays every row onto the live map.
    /// Returns the number of rows applied.
    pub async fn refresh(&self, db: &DatabaseService) -> Result<usize, LumenError> {
        let rows = db.load_game_config().await?;
        let count = rows.len();
        let now = Utc::now();

        {
            let mut cache = self.cache.write();
            let mut timestamps = self.timestamps.write();
            for (key, value) in rows {
                timestamps.insert(key.clone(), now);
                cache.insert(key, value);
            }
        }

        self.metrics.record_refresh();
        prom::CONFIG_REFRESHES_TOTAL.inc();
        debug!(config_rows = count, "dynamic config refreshed from database");
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Retrieves a value by dot path. Missing segments fall back to the
    /// defaults snapshot, then to `None`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let start = Instant::now();
        let segments = normalize_json_path(path);
        if segments.is_empty() {
            return None;
        }

        if !self.initialized.load(Ordering::SeqCst) {
            warn!(path, "config manager not initialized, serving defaults");
            self.metrics.record_fallback();
            let result = walk(&self.defaults.read(), &segments);
            self.metrics.record_get(start.elapsed());
            return result;
        }

        self.note_staleness(&segments[0]);

        let from_cache = walk(&self.cache.read(), &segments);
        let result = match from_cache {
            Some(value) => {
                self.metrics.record_hit();
                Some(value)
            }
            None => {
                self.metrics.record_miss();
                let fallback = walk(&self.defaults.read(), &segments);
                if fallback.is_some() {
                    self.metrics.record_fallback();
                }
                fallback
            }
        };
        self.metrics.record_get(start.elapsed());
        result
    }

    /// Retrieves a value by dot path, or the supplied default.
    pub fn get_or(&self, path: &str, default: Value) -> Value {
        self.get(path).unwrap_or(default)
    }

    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        self.get(path).and_then(|v| v.as_i64()).unwrap_or(default)
    }

    pub fn get_u64(&self, path: &str, default: u64) -> u64 {
        self.get(path).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    pub fn get_f64(&self, path: &str, default: f64) -> f64 {
        self.get(path).and_then(|v| v.as_f64()).unwrap_or(default)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    pub fn get_str(&self, path: &str, default: &str) -> String {
        self.get(path)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    /// All top-level keys currently cached.
    pub fn all_keys(&self) -> Vec<String> {
        self.cache.read().keys().cloned().collect()
    }

    /// Age in seconds of a cached top-level key, when it came from the
    /// database overlay.
    pub fn cache_age_secs(&self, key: &str) -> Option<i64> {
        self.timestamps
            .read()
            .get(key)
            .map(|t| (Utc::now() - *t).num_seconds())
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Updates a config value by dot path: validates the resulting top-level
    /// subtree against any registered schema, upserts the row transactionally,
    /// and updates the in-memory map. Rolls back on any failure.
    pub async fn set(
        &self,
        db: &DatabaseService,
        path: &str,
        value: Value,
        modified_by: &str,
    ) -> Result<(), LumenError> {
        let start = Instant::now();
        let segments = normalize_json_path(path);
        let Some(top_key) = segments.first().cloned() else {
            return Err(LumenError::ConfigValidation(
                "config path cannot be empty".to_string(),
            ));
        };

        // Build the full top-level subtree with the new value applied.
        let final_value = if segments.len() == 1 {
            value
        } else {
            let mut subtree = self
                .cache
                .read()
                .get(&top_key)
                .cloned()
                .unwrap_or(Value::Object(Map::new()));
            json_path_set(&mut subtree, &segments[1..], value);
            subtree
        };

        // Registered schemas gate the write; unregistered keys pass through.
        if let Some(schema) = self.schemas.read().get(&top_key) {
            schema.validate(&final_value, &top_key).inspect_err(|_| {
                self.metrics.record_error();
            })?;
        }

        db.upsert_game_config(&top_key, &final_value, modified_by)
            .await
            .inspect_err(|e| {
                self.metrics.record_error();
                error!(path, modified_by, error = %e, "config write failed, transaction rolled back");
            })?;

        {
            let mut cache = self.cache.write();
            cache.insert(top_key.clone(), final_value);
            self.timestamps.write().insert(top_key, Utc::now());
        }

        self.metrics.record_set(start.elapsed());
        info!(path, modified_by, "dynamic config updated");
        Ok(())
    }

    /// Registers (or replaces) the schema for a top-level key.
    pub fn register_schema(&self, top_key: &str, schema: ConfigSchema) {
        self.schemas.write().insert(top_key.to_string(), schema);
    }

    // ------------------------------------------------------------------
    // Health & metrics
    // ------------------------------------------------------------------

    pub fn metrics(&self) -> &ConfigMetrics {
        &self.metrics
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Called by the refresh task to expose liveness in the health snapshot.
    pub fn set_refresh_running(&self, running: bool) {
        self.refresh_running.store(running, Ordering::SeqCst);
    }

    pub fn health(&self) -> ConfigHealth {
        let initialized = self.is_initialized();
        let refresh_task_running = self.refresh_running.load(Ordering::SeqCst);
        let cached_configs = self.cache.read().len();
        ConfigHealth {
            healthy: initialized
                && refresh_task_running
                && cached_configs > 0
                && self.metrics.within_error_budget(),
            initialized,
            refresh_task_running,
            cached_configs,
            errors: self.metrics.errors(),
        }
    }

    /// Records a stale read when a database-sourced key has outlived two
    /// refresh intervals, which indicates the refresh task is falling behind.
    fn note_staleness(&self, top_key: &str) {
        if let Some(age) = self.cache_age_secs(top_key)
            && age as u64 > self.refresh_secs * 2
        {
            self.metrics.record_stale_read();
        }
    }
}

/// Walks a top-level map by path segments.
fn walk(map: &Map<String, Value>, segments: &[String]) -> Option<Value> {
    let (first, rest) = segments.split_first()?;
    let mut node = map.get(first)?;
    for segment in rest {
        match node {
            Value::Object(inner) => node = inner.get(segment)?,
            _ => return None,
        }
    }
    Some(node.clone())
}

fn collect_yaml_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), LumenError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_yaml_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn load_yaml_file(path: &Path) -> Result<Option<Map<String, Value>>, LumenError> {
    let contents = std::fs::read_to_string(path)?;
    if contents.trim().is_empty() {
        return Ok(None);
    }
    let yaml: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    let json = serde_json::to_value(yaml)?;
    match json {
        Value::Object(map) => Ok(Some(map)),
        Value::Null => Ok(None),
        other => Err(LumenError::ConfigValidation(format!(
            "config file {} must contain a top-level mapping; got {}",
            path.display(),
            match other {
                Value::Array(_) => "array",
                Value::String(_) => "string",
                Value::Number(_) => "number",
                Value::Bool(_) => "bool",
                _ => "null",
            }
        ))),
    }
}
