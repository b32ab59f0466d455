// src/server/context.rs

//! The application context: constructed services wired in dependency order.
//!
//! Startup order (leaves first): database service → store client → dynamic
//! config → cache engine → event bus → audit logger → resource service →
//! health monitor. Shutdown runs in reverse. Handlers receive this context
//! and never construct infrastructure themselves.

use crate::config::{Config, Environment};
use crate::core::LumenError;
use crate::core::audit::{AUDIT_TOPIC, AuditLogger};
use crate::core::cache::CacheEngine;
use crate::core::config::ConfigManager;
use crate::core::db::DatabaseService;
use crate::core::events::EventBus;
use crate::core::resource::{ConfigModifierProvider, ResourceService};
use crate::core::store::{StoreHealthMonitor, StoreService};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Holds every initialized core service.
pub struct AppContext {
    pub config: Arc<Config>,
    pub db: Arc<DatabaseService>,
    pub store: Arc<StoreService>,
    pub dynamic_config: Arc<ConfigManager>,
    pub cache: Arc<CacheEngine>,
    pub event_bus: Arc<EventBus>,
    pub audit: Arc<AuditLogger>,
    pub resources: Arc<ResourceService>,
    pub health_monitor: Arc<StoreHealthMonitor>,
}

impl AppContext {
    /// Initializes all services in dependency order.
    pub async fn initialize(config: Config) -> Result<Arc<Self>, LumenError> {
        let started = Instant::now();
        let config = Arc::new(config);

        let db = Arc::new(DatabaseService::connect(&config).await?);
        info!("database service ready");

        let store = Arc::new(StoreService::connect(&config).await?);
        info!("store service ready");

        let dynamic_config = Arc::new(ConfigManager::new(
            config.config_dir.clone(),
            config.config_refresh_secs,
        ));
        if let Err(e) = dynamic_config.initialize(&db).await {
            // Production must not run on file defaults alone.
            if config.environment == Environment::Production {
                return Err(e);
            }
            warn!(error = %e, "dynamic config degraded to file defaults");
        }
        info!("dynamic config ready");

        let cache = Arc::new(CacheEngine::new(
            Arc::clone(&store),
            Arc::clone(&dynamic_config),
        ));

        let event_bus = Arc::new(EventBus::new());
        let audit = Arc::new(AuditLogger::new(Arc::clone(&event_bus), true));

        // Resource mutations leave stale per-player cache entries behind;
        // this consumer drops them as the audit events stream past.
        let invalidation_cache = Arc::clone(&cache);
        event_bus.subscribe_fn(AUDIT_TOPIC, "cache-invalidation", move |event| {
            let cache = Arc::clone(&invalidation_cache);
            async move {
                let is_resource_event = event
                    .payload
                    .get("transaction_type")
                    .and_then(|t| t.as_str())
                    .is_some_and(|t| {
                        t.starts_with("resource_grant_") || t.starts_with("resource_consume_")
                    });
                if is_resource_event
                    && let Some(player_id) =
                        event.payload.get("player_id").and_then(|p| p.as_i64())
                {
                    cache.invalidate_player(player_id).await;
                }
                Ok(())
            }
        });

        let resources = Arc::new(ResourceService::new(
            Arc::clone(&audit),
            Arc::clone(&dynamic_config),
            config.game,
            Arc::new(ConfigModifierProvider::new(Arc::clone(&dynamic_config))),
        ));

        let health_monitor = Arc::new(StoreHealthMonitor::new(Arc::clone(&store), config.health));

        info!(
            startup_ms = started.elapsed().as_millis() as u64,
            "application context initialized"
        );

        Ok(Arc::new(Self {
            config,
            db,
            store,
            dynamic_config,
            cache,
            event_bus,
            audit,
            resources,
            health_monitor,
        }))
    }

    /// Tears the context down in reverse dependency order.
    pub async fn shutdown(&self) {
        info!("application context shutting down");
        self.db.pool().close().await;
        info!("database pool closed");
    }
}
