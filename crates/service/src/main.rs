//! Sleep disorder prediction service
//!
//! Loads the trained model once at startup and serves `POST /predict`.
//! Startup fails if the artifact set is missing or inconsistent.

use anyhow::{Context, Result};
use sleep_lib::{health::HealthRegistry, observability::StructuredLogger};
use sleep_service::{
    api,
    config::ServiceConfig,
    context::AppContext,
    SERVICE_VERSION,
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sleep-service");

    let config = ServiceConfig::load().context("Failed to load service configuration")?;
    info!(model_dir = %config.model_dir.display(), port = config.port, "Service configured");

    let health_registry = HealthRegistry::new();

    let logger = StructuredLogger::new("service");

    let context = match AppContext::load(&config, &health_registry).await {
        Ok(context) => Arc::new(context),
        Err(e) => {
            error!(error = %e, model_dir = %config.model_dir.display(), "Failed to load model");
            return Err(e).with_context(|| {
                format!("Failed to load model from {}", config.model_dir.display())
            });
        }
    };

    let app_state = Arc::new(api::AppState::new(context.clone(), health_registry));

    let bind_addr = config.bind_addr();
    logger.log_service_started(SERVICE_VERSION, &bind_addr, context.engine().kind().as_str());

    api::serve(&bind_addr, app_state, shutdown_signal()).await?;

    logger.log_service_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
