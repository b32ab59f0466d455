// src/core/events.rs

//! Defines the in-process event bus used to propagate state-change events
//! (audit records, gameplay notifications) to their consumers.
//!
//! Dispatch is sequential: subscribers for a topic are awaited one at a time
//! so that a single publish observes a stable ordering. A failing handler is
//! logged and counted but never prevents delivery to the remaining handlers
//! and never surfaces to the publisher. Delivery is at-least-once within the
//! process; consumers are responsible for idempotency.

use crate::core::errors::LumenError;
use crate::core::metrics;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// The payload attached to every published event.
pub type EventPayload = serde_json::Value;

/// An owned event as delivered to each subscriber.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub payload: EventPayload,
}

/// How a publish went: how many handlers ran, how many of them failed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishOutcome {
    pub handlers: usize,
    pub failures: usize,
}

/// A subscriber registered against one topic.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs when the handler fails.
    fn name(&self) -> &str;

    async fn handle(&self, event: Event) -> Result<(), LumenError>;
}

/// Adapter that lets plain async closures act as subscribers.
struct FnHandler {
    name: String,
    #[allow(clippy::type_complexity)]
    f: Box<dyn Fn(Event) -> BoxFuture<'static, Result<(), LumenError>> + Send + Sync>,
}

#[async_trait]
impl EventHandler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Event) -> Result<(), LumenError> {
        (self.f)(event).await
    }
}

/// The `EventBus` is the central distribution hub for state-change events.
///
/// Subscribers register against a topic string; `publish` dispatches to all of
/// them in registration order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a topic.
    pub fn subscribe(&self, topic: &str, handler: Arc<dyn EventHandler>) {
        let mut subs = self.subscribers.write();
        subs.entry(topic.to_string()).or_default().push(handler);
        debug!(topic, "event subscriber registered");
    }

    /// Registers an async closure as a handler for a topic.
    pub fn subscribe_fn<F, Fut>(&self, topic: &str, name: &str, f: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), LumenError>> + Send + 'static,
    {
        let handler = FnHandler {
            name: name.to_string(),
            f: Box::new(move |event| Box::pin(f(event))),
        };
        self.subscribe(topic, Arc::new(handler));
    }

    /// Publishes a payload to all subscribers of a topic, awaiting each in
    /// sequence. Handler errors are isolated: they are logged and counted,
    /// delivery continues, and the publisher never sees them as errors.
    pub async fn publish(&self, topic: &str, payload: EventPayload) -> PublishOutcome {
        // Snapshot the handler list so the registry lock is not held across
        // any await point.
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subs = self.subscribers.read();
            subs.get(topic).cloned().unwrap_or_default()
        };

        metrics::EVENTS_PUBLISHED_TOTAL
            .with_label_values(&[topic])
            .inc();

        if handlers.is_empty() {
            debug!(topic, "published event with no active subscribers");
            return PublishOutcome::default();
        }

        let mut failures = 0usize;
        for handler in &handlers {
            let event = Event {
                topic: topic.to_string(),
                payload: payload.clone(),
            };
            if let Err(e) = handler.handle(event).await {
                failures += 1;
                metrics::EVENT_HANDLER_FAILURES_TOTAL.inc();
                warn!(
                    topic,
                    handler = handler.name(),
                    error = %e,
                    "event handler failed; continuing delivery"
                );
            }
        }

        PublishOutcome {
            handlers: handlers.len(),
            failures,
        }
    }

    /// Number of subscribers currently registered for a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .get(topic)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
