//! Engine configuration

use crate::commands::DEFAULT_LOG_CAPACITY;
use crate::error::{Error, Result};
use crate::training::{TrainingConfig, DEFAULT_CANCEL_GRACE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Settings for a [`crate::PredictorEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name attached to structured log events
    pub instance_name: String,
    /// Schema under which the virtual tables live
    pub virtual_database: String,
    /// Integration used for `select_data_query` sources
    pub default_integration: String,
    /// Enables persistence of datasources and the command log
    pub data_dir: Option<PathBuf>,
    /// Grace period for a cancelled learning engine to return
    pub cancel_grace_ms: u64,
    /// Deadline applied to every training job, unless the predictor sets a shorter one
    pub default_training_timeout_secs: Option<u64>,
    /// Entries kept in the command log
    pub command_log_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            instance_name: "predictor-engine".to_string(),
            virtual_database: "mindsdb".to_string(),
            default_integration: "default".to_string(),
            data_dir: None,
            cancel_grace_ms: DEFAULT_CANCEL_GRACE.as_millis() as u64,
            default_training_timeout_secs: None,
            command_log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.virtual_database.trim().is_empty() {
            return Err(Error::InvalidStatement(
                "virtual_database must not be empty".to_string(),
            ));
        }
        if self.default_integration.trim().is_empty() {
            return Err(Error::InvalidStatement(
                "default_integration must not be empty".to_string(),
            ));
        }
        if self.command_log_capacity == 0 {
            return Err(Error::InvalidStatement(
                "command_log_capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            cancel_grace: Duration::from_millis(self.cancel_grace_ms),
            max_training_time: self.default_training_timeout_secs.map(Duration::from_secs),
            default_integration: self.default_integration.clone(),
        }
    }

    pub fn datasource_dir(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("datasources"))
    }

    pub fn command_log_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|d| d.join("commands.json"))
    }
}
