//! Prediction query engine
//!
//! A `SELECT` on a predictor's table is either a point query, whose equality
//! conditions form a single feature row, or a bulk query, whose input rows
//! come from `select_data_query` or `external_datasource`. Inference runs
//! while the predictor is pinned in the registry, so a concurrent delete
//! waits for the query to finish.

mod engine;
mod predicate;

pub use engine::PredictionQueryEngine;
pub use predicate::{BulkSource, Condition, Operator, QueryShape};
