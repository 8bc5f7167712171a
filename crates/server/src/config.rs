//! Server configuration and seed data

use anyhow::{Context, Result};
use predictor_lib::{EngineConfig, RowSet};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Environment variable naming an optional configuration file
pub const CONFIG_FILE_ENV: &str = "PREDICTOR_CONFIG";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// API server port for statements, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON file with tables and datasources loaded at startup
    #[serde(default)]
    pub seed_file: Option<PathBuf>,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_api_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            seed_file: None,
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional file and `PREDICTOR_*` environment
    /// variables (`PREDICTOR_ENGINE__DATA_DIR` for nested keys)
    pub fn load() -> Result<Self> {
        let file = std::env::var(CONFIG_FILE_ENV).ok();
        Self::load_from(file.as_deref())
    }

    pub fn load_from(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::with_name(file).required(false));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("PREDICTOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ServerConfig = config.try_deserialize().unwrap_or_else(|e| {
            warn!(error = %e, "Invalid configuration, using defaults");
            ServerConfig::default()
        });
        config
            .engine
            .validate()
            .context("Invalid engine configuration")?;
        Ok(config)
    }
}

/// Startup data: tables of the default integration plus stored datasources
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub tables: BTreeMap<String, RowSet>,
    #[serde(default)]
    pub datasources: BTreeMap<String, RowSet>,
}

impl Seed {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read seed file {:?}", path))?;
        serde_json::from_slice(&data)
            .with_context(|| format!("Failed to parse seed file {:?}", path))
    }
}
