//! Predictive tables CLI
//!
//! Trains predictors, runs prediction queries and manages datasources
//! through the predictor server's HTTP API.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod output;
