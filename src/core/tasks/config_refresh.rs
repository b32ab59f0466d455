// src/core/tasks/config_refresh.rs

//! A background task that periodically re-reads the `game_config` table and
//! overlays it onto the in-memory dynamic configuration, giving operators
//! hot-reload without a redeploy. The shutdown signal is consulted every
//! iteration; refresh failures are logged and the loop continues.

use crate::core::config::ConfigManager;
use crate::core::db::DatabaseService;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// The background task struct for dynamic-config refresh.
pub struct ConfigRefreshTask {
    config: Arc<ConfigManager>,
    db: Arc<DatabaseService>,
    interval: Duration,
}

impl ConfigRefreshTask {
    pub fn new(config: Arc<ConfigManager>, db: Arc<DatabaseService>, refresh_secs: u64) -> Self {
        Self {
            config,
            db,
            interval: Duration::from_secs(refresh_secs.max(1)),
        }
    }

    /// The main run loop. Ticks on the configured interval until shutdown.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "config refresh task started"
        );
        self.config.set_refresh_running(true);

        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; initialization already loaded the
        // overlay, so skip it.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.config.refresh(&self.db).await {
                        Ok(rows) => debug!(rows, "config refresh cycle completed"),
                        Err(e) => warn!(error = %e, "config refresh cycle failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("config refresh task shutting down");
                    self.config.set_refresh_running(false);
                    return;
                }
            }
        }
    }
}
