// src/core/audit/mod.rs

//! The audit trail producer.
//!
//! Every state change becomes a canonical, validated audit event published to
//! the event bus under `audit.transaction.logged`. This module never persists
//! anything: a dedicated consumer subscribes to the topic and owns storage.
//! Validation failures surface to the caller (a malformed audit record means
//! the mutation itself is suspect); publish-side problems are logged and
//! counted but never crash gameplay.

pub mod validator;

use crate::core::errors::LumenError;
use crate::core::events::EventBus;
use crate::core::metrics as prom;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error};

pub use validator::{DetailSchema, FieldType, TransactionValidator};

/// The canonical audit topic.
pub const AUDIT_TOPIC: &str = "audit.transaction.logged";

/// One entry in a [`AuditLogger::batch_log`] call.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub player_id: i64,
    pub transaction_type: String,
    pub details: Map<String, Value>,
    pub context: Option<String>,
    pub meta: Option<Map<String, Value>>,
}

/// In-memory metrics for audit event production.
#[derive(Debug, Default)]
pub struct AuditMetrics {
    events_emitted: AtomicU64,
    batch_events_emitted: AtomicU64,
    validation_errors: AtomicU64,
    publish_errors: AtomicU64,
    total_log_time_us: AtomicU64,
}

/// Derived audit metrics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct AuditMetricsSummary {
    pub events_emitted: u64,
    pub batch_events_emitted: u64,
    pub validation_errors: u64,
    pub publish_errors: u64,
    pub error_rate: f64,
    pub avg_log_time_ms: f64,
}

impl AuditMetrics {
    pub fn summary(&self) -> AuditMetricsSummary {
        let emitted = self.events_emitted.load(Ordering::Relaxed);
        let batch = self.batch_events_emitted.load(Ordering::Relaxed);
        let validation = self.validation_errors.load(Ordering::Relaxed);
        let publish = self.publish_errors.load(Ordering::Relaxed);
        let total = (emitted + batch).max(1);

        AuditMetricsSummary {
            events_emitted: emitted,
            batch_events_emitted: batch,
            validation_errors: validation,
            publish_errors: publish,
            error_rate: (validation + publish) as f64 / total as f64,
            avg_log_time_ms: self.total_log_time_us.load(Ordering::Relaxed) as f64
                / total as f64
                / 1000.0,
        }
    }
}

/// Shapes, validates, and publishes audit events.
pub struct AuditLogger {
    bus: Arc<EventBus>,
    validator: TransactionValidator,
    metrics: AuditMetrics,
}

impl AuditLogger {
    pub fn new(bus: Arc<EventBus>, allow_unknown_types: bool) -> Self {
        Self {
            bus,
            validator: TransactionValidator::new(allow_unknown_types),
            metrics: AuditMetrics::default(),
        }
    }

    pub fn validator(&self) -> &TransactionValidator {
        &self.validator
    }

    pub fn metrics(&self) -> &AuditMetrics {
        &self.metrics
    }

    /// Publishes one canonical audit event.
    ///
    /// # Errors
    ///
    /// `AuditValidation` when `validate` is on and the payload fails its
    /// schema. A malformed audit payload refuses to emit.
    pub async fn log(
        &self,
        player_id: i64,
        transaction_type: &str,
        details: Map<String, Value>,
        context: Option<&str>,
        meta: Option<Map<String, Value>>,
        validate: bool,
    ) -> Result<(), LumenError> {
        let start = Instant::now();

        let (sanitized, context) = if validate {
            let sanitized = self
                .validator
                .validate_transaction(transaction_type, details)
                .inspect_err(|e| {
                    self.metrics
                        .validation_errors
                        .fetch_add(1, Ordering::Relaxed);
                    prom::AUDIT_VALIDATION_FAILURES_TOTAL.inc();
                    error!(
                        player_id,
                        transaction_type,
                        error = %e,
                        "audit validation failed"
                    );
                })?;
            (sanitized, self.validator.validate_context(context))
        } else {
            (
                details,
                context.map(str::to_string).unwrap_or_else(|| "unknown".to_string()),
            )
        };

        let payload = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "player_id": player_id,
            "transaction_type": transaction_type,
            "details": Value::Object(sanitized),
            "context": context,
            "meta": Value::Object(meta.unwrap_or_default()),
        });

        let outcome = self.bus.publish(AUDIT_TOPIC, payload).await;
        if outcome.failures > 0 {
            // Consumer trouble is not the producer's failure; count it and
            // move on.
            self.metrics
                .publish_errors
                .fetch_add(outcome.failures as u64, Ordering::Relaxed);
        }

        let elapsed = start.elapsed();
        self.metrics.events_emitted.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .total_log_time_us
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
        prom::AUDIT_EVENTS_TOTAL.inc();

        debug!(
            player_id,
            transaction_type,
            log_time_us = elapsed.as_micros() as u64,
            "audit event emitted"
        );
        Ok(())
    }

    /// Convenience wrapper for single-resource change events. Emits
    /// `resource_change_{resource_type}`.
    pub async fn log_resource_change(
        &self,
        player_id: i64,
        resource_type: &str,
        old_value: i64,
        new_value: i64,
        reason: &str,
        context: Option<&str>,
    ) -> Result<(), LumenError> {
        let mut details = Map::new();
        details.insert("resource_type".into(), json!(resource_type));
        details.insert("old_value".into(), json!(old_value));
        details.insert("new_value".into(), json!(new_value));
        details.insert("delta".into(), json!(new_value - old_value));
        details.insert("reason".into(), json!(reason));

        self.log(
            player_id,
            &format!("resource_change_{resource_type}"),
            details,
            context,
            None,
            true,
        )
        .await
    }

    /// Convenience wrapper for maiden collection changes. Emits
    /// `maiden_{action}`.
    pub async fn log_maiden_change(
        &self,
        player_id: i64,
        action: &str,
        maiden_id: i64,
        maiden_name: &str,
        tier: u32,
        quantity_change: i64,
        context: Option<&str>,
    ) -> Result<(), LumenError> {
        let mut details = Map::new();
        details.insert("action".into(), json!(action));
        details.insert("maiden_id".into(), json!(maiden_id));
        details.insert("maiden_name".into(), json!(maiden_name));
        details.insert("tier".into(), json!(tier));
        details.insert("quantity_change".into(), json!(quantity_change));

        self.log(
            player_id,
            &format!("maiden_{action}"),
            details,
            context,
            None,
            true,
        )
        .await
    }

    /// Convenience wrapper for fusion attempts.
    pub async fn log_fusion_attempt(
        &self,
        player_id: i64,
        success: bool,
        tier: u32,
        cost: i64,
        result_tier: Option<u32>,
        context: Option<&str>,
    ) -> Result<(), LumenError> {
        let mut details = Map::new();
        details.insert("success".into(), json!(success));
        details.insert("tier".into(), json!(tier));
        details.insert("cost".into(), json!(cost));
        if let Some(result_tier) = result_tier {
            details.insert("result_tier".into(), json!(result_tier));
        }

        self.log(player_id, "fusion_attempt", details, context, None, true)
            .await
    }

    /// Emits a batch of audit events, returning how many were published.
    /// Entries failing validation are skipped and counted.
    pub async fn batch_log(&self, entries: Vec<AuditEntry>) -> usize {
        let mut emitted = 0usize;
        for entry in entries {
            match self
                .log(
                    entry.player_id,
                    &entry.transaction_type,
                    entry.details,
                    entry.context.as_deref(),
                    entry.meta,
                    true,
                )
                .await
            {
                Ok(()) => {
                    emitted += 1;
                    // `log` counted this under single events; move it to the
                    // batch counter instead.
                    self.metrics.events_emitted.fetch_sub(1, Ordering::Relaxed);
                    self.metrics
                        .batch_events_emitted
                        .fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    error!(error = %e, "batch audit entry failed validation, skipped");
                }
            }
        }
        emitted
    }
}
