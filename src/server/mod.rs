// src/server/mod.rs

use crate::config::Config;
use crate::core::store::StoreHealthMonitor;
use crate::core::tasks::config_refresh::ConfigRefreshTask;
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{filter::EnvFilter, reload};

pub mod context;
mod metrics_server;

pub use context::AppContext;

/// The main startup function: builds the application context, spawns the
/// background tasks, and blocks until shutdown.
pub async fn run(
    config: Config,
    log_reload_handle: Arc<reload::Handle<EnvFilter, tracing_subscriber::Registry>>,
) -> Result<()> {
    // 1. Initialize every core service in dependency order.
    let context = AppContext::initialize(config).await?;

    // The dynamic config may carry a log-level override; apply it now that
    // the overlay is loaded. LOG_LEVEL is a reloadable key.
    let log_level = context
        .dynamic_config
        .get_str("logging.level", &context.config.log_level);
    if log_level != context.config.log_level {
        match log_reload_handle.reload(EnvFilter::new(&log_level)) {
            Ok(()) => info!(log_level, "log level overridden by dynamic config"),
            Err(e) => warn!(error = %e, "failed to apply dynamic log level"),
        }
    }

    // 2. Spawn all background tasks with a shared shutdown signal.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut background_tasks: JoinSet<()> = JoinSet::new();

    let monitor: Arc<StoreHealthMonitor> = Arc::clone(&context.health_monitor);
    background_tasks.spawn(monitor.run(shutdown_tx.subscribe()));

    let refresh_task = ConfigRefreshTask::new(
        Arc::clone(&context.dynamic_config),
        Arc::clone(&context.db),
        context.config.config_refresh_secs,
    );
    background_tasks.spawn(refresh_task.run(shutdown_tx.subscribe()));

    if context.config.metrics.enabled {
        background_tasks.spawn(metrics_server::run_metrics_server(
            Arc::clone(&context),
            shutdown_tx.subscribe(),
        ));
    }

    info!(
        environment = %context.config.environment,
        "lumen backend running; press Ctrl-C to stop"
    );

    // 3. Block until the process is asked to stop.
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");

    // 4. Stop background tasks, then tear down services in reverse order.
    let _ = shutdown_tx.send(());
    while background_tasks.join_next().await.is_some() {}
    context.shutdown().await;

    info!("shutdown complete");
    Ok(())
}
