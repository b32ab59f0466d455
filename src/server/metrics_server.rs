// src/server/metrics_server.rs

use crate::core::metrics::gather_metrics;
use crate::server::context::AppContext;
use axum::{Json, Router, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint, encoding all registered
/// metrics in the Prometheus text format.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        gather_metrics(),
    )
}

/// Handles /healthz: a JSON snapshot combining store health, circuit breaker
/// states, and the cache/config/audit health predicates.
async fn healthz_handler(context: Arc<AppContext>) -> impl IntoResponse {
    let store_health = context.health_monitor.snapshot();
    let config_health = context.dynamic_config.health();
    let cache_healthy = context.cache.is_healthy();
    let db_healthy = context.db.health_check().await;

    let healthy =
        store_health.state != "UNHEALTHY" && config_health.initialized && cache_healthy && db_healthy;

    let body = json!({
        "healthy": healthy,
        "store": {
            "health": store_health,
            "status": context.store.status(),
        },
        "database": {
            "healthy": db_healthy,
            "circuit": context.db.circuit_snapshot(),
        },
        "cache": {
            "healthy": cache_healthy,
            "metrics": context.cache.metrics().summary(),
        },
        "config": config_health,
        "audit": context.audit.metrics().summary(),
        "resources": context.resources.metrics().summary(),
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Runs the HTTP server exposing Prometheus metrics and the health snapshot.
pub async fn run_metrics_server(context: Arc<AppContext>, mut shutdown_rx: broadcast::Receiver<()>) {
    let port = context.config.metrics.port;
    let healthz_context = Arc::clone(&context);

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route(
            "/healthz",
            get(move || healthz_handler(healthz_context.clone())),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("metrics server listening on http://{}/metrics", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("failed to bind metrics server on port {}: {}", port, e);
            return;
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("metrics server shutting down");
        })
        .await
    {
        error!("metrics server error: {}", e);
    }
}
