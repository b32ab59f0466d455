// src/main.rs

//! The main entry point for the Lumen backend service.

use anyhow::Result;
use lumen::config::Config;
use lumen::server;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{filter::EnvFilter, prelude::*, reload};

#[tokio::main]
async fn main() -> Result<()> {
    // Load a `.env` file if one is present; real environment variables win.
    dotenvy::dotenv().ok();

    // Handle the --version flag.
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    if std::env::args().any(|a| a == "--version") {
        println!("Lumen version {VERSION}");
        return Ok(());
    }

    // Static configuration must resolve before anything else starts; a
    // missing required key in production is fatal here.
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from environment: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging with reloading capabilities.
    // RUST_LOG overrides the configured level when set.
    let initial_log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    let (filter, reload_handle) = reload::Layer::new(EnvFilter::new(initial_log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    // The handle allows dynamic log-level changes at runtime.
    let reload_handle = Arc::new(reload_handle);

    if let Err(e) = server::run(config, reload_handle).await {
        error!("Server runtime error: {}", e);
        return Err(e);
    }

    Ok(())
}
