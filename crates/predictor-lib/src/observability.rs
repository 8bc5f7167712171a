//! Observability infrastructure for the predictor engine
//!
//! Provides:
//! - Prometheus metrics (training duration, inference latency, job and command counters)
//! - Structured JSON logging with tracing

use crate::models::PredictorStatus;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for training duration (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Histogram buckets for inference latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    training_duration_seconds: Histogram,
    inference_latency_seconds: Histogram,
    training_jobs_active: IntGauge,
    training_jobs_total: IntCounterVec,
    predictors_by_status: IntGaugeVec,
    commands_processed: IntCounter,
    commands_failed: IntCounter,
    prediction_rows: IntCounter,
    statement_errors: IntCounterVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            training_duration_seconds: register_histogram!(
                "predictor_training_duration_seconds",
                "Wall-clock time of training jobs",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            inference_latency_seconds: register_histogram!(
                "predictor_inference_latency_seconds",
                "Time spent running inference for one prediction query",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register inference_latency_seconds"),

            training_jobs_active: register_int_gauge!(
                "predictor_training_jobs_active",
                "Number of training jobs currently running"
            )
            .expect("Failed to register training_jobs_active"),

            training_jobs_total: register_int_counter_vec!(
                "predictor_training_jobs_total",
                "Finished training jobs by outcome",
                &["outcome"]
            )
            .expect("Failed to register training_jobs_total"),

            predictors_by_status: register_int_gauge_vec!(
                "predictor_predictors",
                "Registered predictors by lifecycle status",
                &["status"]
            )
            .expect("Failed to register predictors_by_status"),

            commands_processed: register_int_counter!(
                "predictor_commands_processed_total",
                "Commands consumed from the command log"
            )
            .expect("Failed to register commands_processed"),

            commands_failed: register_int_counter!(
                "predictor_commands_failed_total",
                "Commands that were consumed but failed"
            )
            .expect("Failed to register commands_failed"),

            prediction_rows: register_int_counter!(
                "predictor_prediction_rows_total",
                "Rows returned by prediction queries"
            )
            .expect("Failed to register prediction_rows"),

            statement_errors: register_int_counter_vec!(
                "predictor_statement_errors_total",
                "Statements that failed, by error code",
                &["code"]
            )
            .expect("Failed to register statement_errors"),
        }
    }
}

/// Engine metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new)
    }

    pub fn training_started(&self) {
        self.inner().training_jobs_active.inc();
    }

    /// Record a finished job; `outcome` is `complete` or `error`
    pub fn training_finished(&self, outcome: &str, duration_secs: f64) {
        let inner = self.inner();
        inner.training_jobs_active.dec();
        inner.training_duration_seconds.observe(duration_secs);
        inner.training_jobs_total.with_label_values(&[outcome]).inc();
    }

    pub fn observe_inference_latency(&self, duration_secs: f64) {
        self.inner().inference_latency_seconds.observe(duration_secs);
    }

    pub fn add_prediction_rows(&self, rows: usize) {
        self.inner().prediction_rows.inc_by(rows as u64);
    }

    pub fn set_predictor_counts(&self, counts: &HashMap<PredictorStatus, usize>) {
        for status in PredictorStatus::ALL {
            let count = counts.get(&status).copied().unwrap_or(0);
            self.inner()
                .predictors_by_status
                .with_label_values(&[status.as_str()])
                .set(count as i64);
        }
    }

    pub fn inc_commands_processed(&self) {
        self.inner().commands_processed.inc();
    }

    pub fn inc_commands_failed(&self) {
        self.inner().commands_failed.inc();
    }

    pub fn inc_statement_errors(&self, code: &str) {
        self.inner().statement_errors.with_label_values(&[code]).inc();
    }
}

/// Structured logger for engine events
///
/// One JSON line per lifecycle event, tagged with the engine instance name.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_training_started(&self, predictor: &str, source: &str, deadline_secs: Option<u64>) {
        info!(
            event = "training_started",
            instance = %self.instance,
            predictor = %predictor,
            source = %source,
            deadline_secs = ?deadline_secs,
            "Training job started"
        );
    }

    pub fn log_training_completed(&self, predictor: &str, duration_ms: u128, partial: bool) {
        info!(
            event = "training_completed",
            instance = %self.instance,
            predictor = %predictor,
            duration_ms = duration_ms as u64,
            partial = partial,
            "Predictor training completed"
        );
    }

    pub fn log_training_failed(&self, predictor: &str, duration_ms: u128, error: &str) {
        warn!(
            event = "training_failed",
            instance = %self.instance,
            predictor = %predictor,
            duration_ms = duration_ms as u64,
            error = %error,
            "Predictor training failed"
        );
    }

    pub fn log_training_deadline(&self, predictor: &str, deadline_secs: u64) {
        warn!(
            event = "training_deadline",
            instance = %self.instance,
            predictor = %predictor,
            deadline_secs = deadline_secs,
            "Training deadline reached, cancelling job"
        );
    }

    pub fn log_predictor_deleted(&self, predictor: &str, status: PredictorStatus, force: bool) {
        info!(
            event = "predictor_deleted",
            instance = %self.instance,
            predictor = %predictor,
            status = %status,
            force = force,
            "Predictor deleted"
        );
    }

    pub fn log_command(&self, seq: u64, command: &str, outcome: Result<&str, &str>) {
        match outcome {
            Ok(detail) => info!(
                event = "command_consumed",
                instance = %self.instance,
                seq = seq,
                command = %command,
                detail = %detail,
                "Command processed"
            ),
            Err(error) => warn!(
                event = "command_failed",
                instance = %self.instance,
                seq = seq,
                command = %command,
                error = %error,
                "Command failed, skipping"
            ),
        }
    }

    pub fn log_datasource(&self, name: &str, action: &str, rows: usize) {
        info!(
            event = "datasource_changed",
            instance = %self.instance,
            datasource = %name,
            action = %action,
            rows = rows,
            "Datasource changed"
        );
    }

    pub fn log_startup(&self, version: &str, learning_engine: &str) {
        info!(
            event = "engine_started",
            instance = %self.instance,
            version = %version,
            learning_engine = %learning_engine,
            "Predictor engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Predictor engine shutting down"
        );
    }
}
