//! Predictive tables engine
//!
//! Machine-learning predictors exposed as tables of a virtual SQL database:
//! - `predictors`: one row per predictor; inserting a row trains one
//! - `commands`: administrative commands consumed in the background
//! - one table per completed predictor, answering prediction queries
//!
//! The SQL front-end hands parsed statements to [`PredictorEngine::execute`].

pub mod commands;
pub mod config;
pub mod datasource;
pub mod engine;
pub mod error;
pub mod health;
pub mod integration;
pub mod models;
pub mod observability;
pub mod persist;
pub mod query;
pub mod registry;
pub mod router;
pub mod training;

pub use config::EngineConfig;
pub use engine::{PredictorEngine, PredictorEngineBuilder};
pub use error::{Error, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
pub use query::{Condition, Operator};
pub use router::{Statement, StatementOutcome, TableRef};
