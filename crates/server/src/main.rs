//! Predictor server - predictive tables over HTTP
//!
//! Hosts the engine, drains the `commands` table in the background and
//! serves statements, health and metrics.

use anyhow::{Context, Result};
use predictor_lib::{
    datasource::{DatasourceKind, DatasourcePayload},
    integration::MemoryIntegration,
    Error, HealthRegistry, PredictorEngine,
};
use predictor_server::{
    api,
    config::{Seed, ServerConfig},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting predictor-server");

    let config = ServerConfig::load()?;
    let seed = match &config.seed_file {
        Some(path) => Seed::load(path)?,
        None => Seed::default(),
    };
    info!(
        api_port = config.api_port,
        virtual_database = %config.engine.virtual_database,
        seed_tables = seed.tables.len(),
        "Server configured"
    );

    // Seed tables are served by the default integration
    let memory = MemoryIntegration::new(config.engine.default_integration.clone());
    for (table, rows) in seed.tables {
        memory.insert_table(table, rows);
    }

    let health_registry = HealthRegistry::new();
    let engine = PredictorEngine::builder(config.engine.clone())
        .integration(Arc::new(memory))
        .health(health_registry.clone())
        .build()
        .await
        .context("Failed to initialize engine")?;
    let engine = Arc::new(engine);

    for (name, rows) in seed.datasources {
        match engine
            .save_datasource(&name, DatasourceKind::File, DatasourcePayload::Rows { rows })
            .await
        {
            Ok(_) | Err(Error::AlreadyExists(_)) => {}
            Err(e) => warn!(datasource = %name, error = %e, "Failed to seed datasource"),
        }
    }

    let logger = engine.logger().clone();
    logger.log_startup(SERVER_VERSION, engine.orchestrator().engine_name());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let consumer_handle = engine.spawn_command_consumer(shutdown_rx)?;

    let app_state = Arc::new(api::AppState::new(engine.clone()));

    // Mark server as ready after initialization
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());
    if let Err(e) = consumer_handle.await {
        warn!(error = %e, "Command consumer did not stop cleanly");
    }
    api_handle.abort();

    Ok(())
}
