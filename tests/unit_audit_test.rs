use lumen::LumenError;
use lumen::core::audit::{AUDIT_TOPIC, AuditLogger, DetailSchema, FieldType, TransactionValidator};
use lumen::core::events::EventBus;
use serde_json::{Map, Value, json};
use std::sync::Arc;

fn details(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn capture_bus() -> (Arc<EventBus>, Arc<parking_lot::Mutex<Vec<Value>>>) {
    let bus = Arc::new(EventBus::new());
    let captured = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    bus.subscribe_fn(AUDIT_TOPIC, "capture", move |event| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(event.payload);
            Ok(())
        }
    });
    (bus, captured)
}

// --- validator ---

#[tokio::test]
async fn test_unknown_type_allowed_when_flag_set() {
    let validator = TransactionValidator::new(true);
    let result = validator.validate_transaction("totally_new_thing", details(&[("x", json!(1))]));
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_unknown_type_rejected_when_flag_unset() {
    let validator = TransactionValidator::new(false);
    let err = validator
        .validate_transaction("totally_new_thing", details(&[]))
        .unwrap_err();
    assert!(matches!(err, LumenError::AuditValidation(_)));
}

#[tokio::test]
async fn test_missing_required_detail_rejected() {
    let validator = TransactionValidator::new(true);
    let err = validator
        .validate_transaction("fusion_attempt", details(&[("tier", json!(3))]))
        .unwrap_err();
    assert!(err.to_string().contains("success"));
}

#[tokio::test]
async fn test_fusion_attempt_valid_payload() {
    let validator = TransactionValidator::new(true);
    let result = validator.validate_transaction(
        "fusion_attempt",
        details(&[
            ("success", json!(true)),
            ("tier", json!(3)),
            ("cost", json!(2500)),
            ("result_tier", json!(4)),
        ]),
    );
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_prefix_schema_applies_to_resource_changes() {
    let validator = TransactionValidator::new(true);
    // Matches the `resource_change_` prefix schema regardless of suffix.
    let err = validator
        .validate_transaction(
            "resource_change_lumees",
            details(&[("old_value", json!(10)), ("new_value", json!("oops")), ("delta", json!(1))]),
        )
        .unwrap_err();
    assert!(err.to_string().contains("new_value"));
}

#[tokio::test]
async fn test_integer_details_normalized_to_signed() {
    let validator = TransactionValidator::new(true);
    let sanitized = validator
        .validate_transaction(
            "resource_change_lumees",
            details(&[
                ("old_value", json!(10u64)),
                ("new_value", json!(20u64)),
                ("delta", json!(10)),
            ]),
        )
        .unwrap();
    assert_eq!(sanitized["old_value"], json!(10));
    assert!(sanitized["old_value"].is_i64());
}

#[tokio::test]
async fn test_context_defaults_to_unknown() {
    let validator = TransactionValidator::new(true);
    assert_eq!(validator.validate_context(None), "unknown");
    assert_eq!(validator.validate_context(Some("   ")), "unknown");
    assert_eq!(validator.validate_context(Some(" /fuse ")), "/fuse");
}

#[tokio::test]
async fn test_registered_custom_schema_enforced() {
    let validator = TransactionValidator::new(true);
    validator.register(
        "shrine_visit",
        DetailSchema::new().required("shrine_id", FieldType::Int),
    );
    let err = validator
        .validate_transaction("shrine_visit", details(&[("shrine_id", json!("four"))]))
        .unwrap_err();
    assert!(matches!(err, LumenError::AuditValidation(_)));
}

// --- logger ---

#[tokio::test]
async fn test_log_publishes_canonical_payload() {
    let (bus, captured) = capture_bus();
    let audit = AuditLogger::new(bus, true);

    audit
        .log(
            123,
            "fusion_attempt",
            details(&[("success", json!(true)), ("tier", json!(3))]),
            Some("/fuse"),
            None,
            true,
        )
        .await
        .unwrap();

    let events = captured.lock();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event["player_id"], 123);
    assert_eq!(event["transaction_type"], "fusion_attempt");
    assert_eq!(event["context"], "/fuse");
    assert_eq!(event["details"]["tier"], 3);
    assert!(event["timestamp"].as_str().unwrap().contains('T'));
    assert!(event["meta"].is_object());
}

#[tokio::test]
async fn test_validation_failure_refuses_to_emit() {
    let (bus, captured) = capture_bus();
    let audit = AuditLogger::new(bus, true);

    let result = audit
        .log(123, "fusion_attempt", details(&[]), Some("/fuse"), None, true)
        .await;

    assert!(matches!(result, Err(LumenError::AuditValidation(_))));
    assert!(captured.lock().is_empty());
    assert_eq!(audit.metrics().summary().validation_errors, 1);
}

#[tokio::test]
async fn test_log_resource_change_computes_delta() {
    let (bus, captured) = capture_bus();
    let audit = AuditLogger::new(bus, true);

    audit
        .log_resource_change(7, "lumees", 10_000, 7_500, "fusion_cost", Some("/fuse"))
        .await
        .unwrap();

    let events = captured.lock();
    let event = &events[0];
    assert_eq!(event["transaction_type"], "resource_change_lumees");
    assert_eq!(event["details"]["delta"], -2_500);
    assert_eq!(event["details"]["reason"], "fusion_cost");
}

#[tokio::test]
async fn test_batch_log_skips_invalid_entries() {
    use lumen::core::audit::AuditEntry;

    let (bus, captured) = capture_bus();
    let audit = AuditLogger::new(bus, true);

    let entries = vec![
        AuditEntry {
            player_id: 1,
            transaction_type: "level_up".to_string(),
            details: details(&[("old_level", json!(1)), ("new_level", json!(2))]),
            context: Some("/quest".to_string()),
            meta: None,
        },
        AuditEntry {
            player_id: 2,
            transaction_type: "level_up".to_string(),
            details: details(&[("old_level", json!(3))]),
            context: None,
            meta: None,
        },
    ];

    let emitted = audit.batch_log(entries).await;
    assert_eq!(emitted, 1);
    assert_eq!(captured.lock().len(), 1);

    let summary = audit.metrics().summary();
    assert_eq!(summary.batch_events_emitted, 1);
    assert_eq!(summary.validation_errors, 1);
}

#[tokio::test]
async fn test_consumer_failure_counts_as_publish_error() {
    let bus = Arc::new(EventBus::new());
    bus.subscribe_fn(AUDIT_TOPIC, "broken-consumer", |_| async {
        Err(LumenError::Internal("consumer down".to_string()))
    });
    let audit = AuditLogger::new(bus, true);

    // The producer must not fail even though the consumer does.
    audit
        .log(
            1,
            "level_up",
            details(&[("old_level", json!(1)), ("new_level", json!(2))]),
            None,
            None,
            true,
        )
        .await
        .unwrap();

    assert_eq!(audit.metrics().summary().publish_errors, 1);
}
