//! Predictor registry and lifecycle state machine
//!
//! The registry is the single owner of predictor records and the only writer
//! of their status. Every predictor name maps to a slot guarded by its own
//! `RwLock`: status writes and deletion take the write side, prediction
//! queries hold the read side for the duration of inference. Deletion thus
//! waits for in-flight queries and no query observes a half-deleted predictor.

mod store;

pub use store::{PredictorHandle, PredictorRegistry};

#[cfg(test)]
mod tests;
