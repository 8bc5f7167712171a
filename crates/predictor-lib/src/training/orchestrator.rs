//! Background training jobs, one per predictor name

use super::{LearningEngine, TrainRequest, TrainedModel};
use crate::datasource::DatasourceStore;
use crate::error::{Error, Result};
use crate::integration::IntegrationRegistry;
use crate::models::{
    PredictorRecord, PredictorStatus, RowSet, Schema, SourceSpec, TrainingOptions,
};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::registry::PredictorRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long a cancelled engine gets to hand back a partial model
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct TrainingConfig {
    pub cancel_grace: Duration,
    /// Global cap applied when a predictor sets no deadline of its own
    pub max_training_time: Option<Duration>,
    /// Integration used for predictors trained from a datasource
    pub default_integration: String,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            cancel_grace: DEFAULT_CANCEL_GRACE,
            max_training_time: None,
            default_integration: "default".to_string(),
        }
    }
}

/// A request to create and train a predictor
#[derive(Debug, Clone)]
pub struct CreatePredictor {
    pub name: String,
    pub predict: Vec<String>,
    pub source: SourceSpec,
    pub options: TrainingOptions,
}

/// Terminal result of a training job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Complete(PredictorRecord),
    Failed(String),
}

/// Completion signal of one submitted job
pub struct TrainingTicket {
    record: PredictorRecord,
    done: watch::Receiver<Option<JobOutcome>>,
}

impl TrainingTicket {
    /// The record as it was created, in `generating`
    pub fn record(&self) -> &PredictorRecord {
        &self.record
    }

    /// Wait for the job to reach `complete` or `error`
    pub async fn wait(mut self) -> Result<PredictorRecord> {
        let outcome = match self.done.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        match outcome {
            Some(JobOutcome::Complete(record)) => Ok(record),
            Some(JobOutcome::Failed(message)) => Err(Error::TrainingFailed(message)),
            None => Err(Error::TrainingFailed(format!(
                "training job for '{}' ended without a result",
                self.record.name
            ))),
        }
    }
}

/// Held by the job of one predictor generation until it finishes or the
/// predictor is deleted
struct TrainingLease {
    generation: u64,
    cancel: CancellationToken,
}

struct Shared {
    registry: Arc<PredictorRegistry>,
    datasources: Arc<DatasourceStore>,
    integrations: Arc<IntegrationRegistry>,
    engine: Arc<dyn LearningEngine>,
    config: TrainingConfig,
    leases: DashMap<String, TrainingLease>,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

/// Launches and supervises training jobs
#[derive(Clone)]
pub struct TrainingOrchestrator {
    shared: Arc<Shared>,
}

impl TrainingOrchestrator {
    pub fn new(
        registry: Arc<PredictorRegistry>,
        datasources: Arc<DatasourceStore>,
        integrations: Arc<IntegrationRegistry>,
        engine: Arc<dyn LearningEngine>,
        config: TrainingConfig,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                registry,
                datasources,
                integrations,
                engine,
                config,
                leases: DashMap::new(),
                metrics: EngineMetrics::new(),
                logger,
            }),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.shared.config
    }

    pub fn engine_name(&self) -> &str {
        self.shared.engine.name()
    }

    /// Register the predictor and start its job in the background
    pub fn submit(&self, request: CreatePredictor) -> Result<TrainingTicket> {
        if request.predict.is_empty() {
            return Err(Error::InvalidStatement(
                "predict must name at least one column".to_string(),
            ));
        }

        let cancel = CancellationToken::new();

        // The lease entry is held while the record is created, so a name can
        // never gain a second job between the two checks.
        let record = match self.shared.leases.entry(request.name.clone()) {
            Entry::Occupied(_) => return Err(Error::TrainingInProgress(request.name)),
            Entry::Vacant(vacant) => {
                let record = self.shared.registry.create(
                    &request.name,
                    request.predict,
                    request.source,
                    request.options,
                )?;
                vacant.insert(TrainingLease {
                    generation: record.generation,
                    cancel: cancel.clone(),
                });
                record
            }
        };

        let (tx, rx) = watch::channel(None);
        let shared = self.shared.clone();
        let job_record = record.clone();
        tokio::spawn(async move {
            let outcome = shared.run_job(job_record.clone(), cancel).await;
            shared.release(&job_record.name, job_record.generation);
            let _ = tx.send(Some(outcome));
        });

        Ok(TrainingTicket { record, done: rx })
    }

    /// Create a predictor, waiting for training when `join_learn_process` is set
    pub async fn create(&self, request: CreatePredictor) -> Result<PredictorRecord> {
        let join = request.options.join_learn_process;
        let ticket = self.submit(request)?;
        if join {
            ticket.wait().await
        } else {
            Ok(ticket.record().clone())
        }
    }

    /// Delete a predictor, cancelling its job when forced.
    ///
    /// The name is free for a new predictor as soon as this returns; the
    /// cancelled job can no longer write to the registry.
    pub async fn delete_predictor(&self, name: &str, force: bool) -> Result<PredictorRecord> {
        let removed = self.shared.registry.delete(name, force).await?;
        if let Some(lease) = self.shared.release(name, removed.generation) {
            lease.cancel.cancel();
        }
        self.shared
            .logger
            .log_predictor_deleted(name, removed.status, force);
        Ok(removed)
    }

    pub fn is_training(&self, name: &str) -> bool {
        self.shared.leases.contains_key(name)
    }

    pub fn active_jobs(&self) -> usize {
        self.shared.leases.len()
    }
}

impl Shared {
    /// Drop the lease of `name` if it still belongs to `generation`
    fn release(&self, name: &str, generation: u64) -> Option<TrainingLease> {
        self.leases
            .remove_if(name, |_, lease| lease.generation == generation)
            .map(|(_, lease)| lease)
    }

    async fn run_job(&self, record: PredictorRecord, cancel: CancellationToken) -> JobOutcome {
        let name = record.name.clone();
        let generation = record.generation;
        let started = Instant::now();
        let deadline = self.deadline(&record.options);

        if let Err(e) = self
            .registry
            .set_status(&name, generation, PredictorStatus::Training, None)
            .await
        {
            debug!(predictor = %name, error = %e, "Predictor gone before training started");
            return JobOutcome::Failed(e.to_string());
        }

        self.metrics.training_started();
        self.logger.log_training_started(
            &name,
            &source_label(&record.source),
            deadline.map(|d| d.as_secs()),
        );

        let result = match self.prepare(&record).await {
            Ok(request) => self.train(request, deadline, cancel).await,
            Err(e) => Err(e),
        };

        let elapsed = started.elapsed();
        let outcome = match result {
            Ok((model, schema)) => {
                let partial = model.is_partial();
                match self.registry.complete(&name, generation, model, schema).await {
                    Ok(record) => {
                        self.metrics
                            .training_finished("complete", elapsed.as_secs_f64());
                        self.logger
                            .log_training_completed(&name, elapsed.as_millis(), partial);
                        JobOutcome::Complete(record)
                    }
                    Err(e) => {
                        self.metrics.training_finished("error", elapsed.as_secs_f64());
                        warn!(predictor = %name, error = %e, "Discarding trained model");
                        JobOutcome::Failed(e.to_string())
                    }
                }
            }
            Err(e) => {
                let message = failure_message(e);
                self.metrics.training_finished("error", elapsed.as_secs_f64());
                self.logger
                    .log_training_failed(&name, elapsed.as_millis(), &message);
                if let Err(e) = self
                    .registry
                    .set_status(&name, generation, PredictorStatus::Error, Some(message.clone()))
                    .await
                {
                    debug!(predictor = %name, error = %e, "Discarding training failure");
                }
                JobOutcome::Failed(message)
            }
        };

        self.metrics
            .set_predictor_counts(&self.registry.status_counts().await);
        outcome
    }

    fn deadline(&self, options: &TrainingOptions) -> Option<Duration> {
        let own = options.stop_training_in_x_seconds.map(Duration::from_secs);
        match (own, self.config.max_training_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    async fn prepare(&self, record: &PredictorRecord) -> Result<TrainRequest> {
        let rows = self.resolve_rows(&record.source).await?;
        if rows.is_empty() {
            return Err(Error::TrainingFailed(format!(
                "{} returned no rows",
                source_label(&record.source)
            )));
        }
        let missing: Vec<&str> = record
            .predict
            .iter()
            .filter(|t| rows.column_index(t).is_none())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::TrainingFailed(format!(
                "target columns missing from training data: {}",
                missing.join(", ")
            )));
        }

        Ok(TrainRequest {
            predictor: record.name.clone(),
            schema: rows.infer_schema(),
            rows,
            targets: record.predict.clone(),
            options: record.options.clone(),
        })
    }

    async fn resolve_rows(&self, source: &SourceSpec) -> Result<RowSet> {
        match source {
            SourceSpec::Datasource { name } => self.datasources.rows(name).await,
            SourceSpec::Query { integration, query } => {
                self.integrations.fetch(integration, query).await
            }
        }
    }

    async fn train(
        &self,
        request: TrainRequest,
        deadline: Option<Duration>,
        cancel: CancellationToken,
    ) -> Result<(Arc<dyn TrainedModel>, Schema)> {
        let name = request.predictor.clone();
        let schema = request.schema.clone();
        let train = self.engine.train(request, cancel.clone());
        tokio::pin!(train);

        let interrupted = async {
            match deadline {
                Some(limit) => tokio::select! {
                    _ = sleep(limit) => Some(limit),
                    _ = cancel.cancelled() => None,
                },
                None => {
                    cancel.cancelled().await;
                    None
                }
            }
        };

        // An engine that is already done wins over a deadline that fires in
        // the same poll.
        let result = tokio::select! {
            biased;
            result = &mut train => result,
            expired = interrupted => {
                let reason = match expired {
                    Some(limit) => {
                        self.logger.log_training_deadline(&name, limit.as_secs());
                        format!("training deadline of {}s exceeded", limit.as_secs())
                    }
                    None => "training cancelled".to_string(),
                };
                cancel.cancel();
                match timeout(self.config.cancel_grace, &mut train).await {
                    Ok(Ok(model)) => Ok(model),
                    Ok(Err(e)) => {
                        debug!(predictor = %name, error = %e, "Engine failed after cancellation");
                        Err(Error::TrainingFailed(reason))
                    }
                    Err(_) => {
                        warn!(predictor = %name, "Engine ignored cancellation");
                        Err(Error::TrainingFailed(reason))
                    }
                }
            }
        };

        result.map(|model| (model, schema))
    }
}

fn source_label(source: &SourceSpec) -> String {
    match source {
        SourceSpec::Query { integration, query } => format!("{}: {}", integration, query),
        SourceSpec::Datasource { name } => format!("datasource {}", name),
    }
}

fn failure_message(error: Error) -> String {
    match error {
        Error::TrainingFailed(message) => message,
        other => other.to_string(),
    }
}
