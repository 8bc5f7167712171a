//! Asynchronous training
//!
//! The learning algorithm itself is a collaborator behind [`LearningEngine`];
//! the orchestrator resolves source data, runs one job per predictor name in
//! the background, enforces deadlines and writes results back to the registry.

mod baseline;
mod orchestrator;


pub use baseline::{BaselineEngine, BaselineModel, DEFAULT_NEIGHBOURS};
pub use orchestrator::{
    CreatePredictor, JobOutcome, TrainingConfig, TrainingOrchestrator, TrainingTicket,
    DEFAULT_CANCEL_GRACE,
};

use crate::error::Result;
use crate::models::{Row, RowSet, Schema, TrainingOptions, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Everything a learning engine needs to fit a model
#[derive(Debug, Clone)]
pub struct TrainRequest {
    pub predictor: String,
    pub rows: RowSet,
    pub schema: Schema,
    pub targets: Vec<String>,
    pub options: TrainingOptions,
}

/// One predicted value with the engine's confidence in it
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub value: Value,
    pub confidence: f64,
}

/// A trained, queryable model handle
pub trait TrainedModel: Send + Sync {
    /// Predict every target column for one input row, in target order
    fn infer(&self, row: &Row) -> Result<Vec<Prediction>>;

    /// True when training was cut short and the model is best-effort
    fn is_partial(&self) -> bool {
        false
    }
}

/// External learning engine
#[async_trait]
pub trait LearningEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Fit a model. Implementations should watch `cancel` and, once it fires,
    /// return either a partial model or an error promptly.
    async fn train(
        &self,
        request: TrainRequest,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn TrainedModel>>;
}
