//! HTTP host for the predictive tables engine

pub mod api;
pub mod config;
