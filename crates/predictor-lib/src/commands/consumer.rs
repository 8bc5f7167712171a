//! Background consumer draining the command log

use super::log::{CommandCursor, CommandEntry, CommandOutcome};
use super::parse::Command;
use crate::datasource::DatasourceStore;
use crate::error::Result;
use crate::health::{components, HealthRegistry};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::training::TrainingOrchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{error, info};

/// Back-off after the log itself fails (e.g. persistence errors)
const LOG_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Sequential consumer of the command log
pub struct CommandConsumer {
    cursor: CommandCursor,
    orchestrator: TrainingOrchestrator,
    datasources: Arc<DatasourceStore>,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl CommandConsumer {
    pub fn new(
        cursor: CommandCursor,
        orchestrator: TrainingOrchestrator,
        datasources: Arc<DatasourceStore>,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            cursor,
            orchestrator,
            datasources,
            health,
            metrics: EngineMetrics::new(),
            logger,
        }
    }

    /// Run until shutdown, one command at a time in enqueue order
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting command consumer");
        self.health.set_healthy(components::COMMAND_CONSUMER).await;

        loop {
            tokio::select! {
                next = self.cursor.next() => {
                    match next {
                        Ok(entry) => {
                            self.process(entry).await;
                        }
                        Err(e) => {
                            error!(error = %e, "Command log unavailable");
                            self.health
                                .set_unhealthy(components::COMMAND_CONSUMER, e.to_string())
                                .await;
                            sleep(LOG_ERROR_BACKOFF).await;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down command consumer");
                    break;
                }
            }
        }
    }

    /// Dispatch one claimed entry and record its outcome
    pub async fn process(&mut self, entry: CommandEntry) -> CommandOutcome {
        let outcome = match self.dispatch(&entry.command).await {
            Ok(detail) => {
                self.metrics.inc_commands_processed();
                self.logger.log_command(entry.seq, &entry.command, Ok(&detail));
                self.health.set_healthy(components::COMMAND_CONSUMER).await;
                CommandOutcome::Succeeded { detail }
            }
            Err(e) => {
                let message = e.to_string();
                self.metrics.inc_commands_processed();
                self.metrics.inc_commands_failed();
                self.logger
                    .log_command(entry.seq, &entry.command, Err(&message));
                self.health
                    .set_degraded(
                        components::COMMAND_CONSUMER,
                        format!("command {} failed: {}", entry.seq, message),
                    )
                    .await;
                CommandOutcome::Failed { error: message }
            }
        };

        if let Err(e) = self.cursor.finish(entry.seq, outcome.clone()).await {
            error!(seq = entry.seq, error = %e, "Failed to record command outcome");
        }
        outcome
    }

    async fn dispatch(&self, text: &str) -> Result<String> {
        match Command::parse(text)? {
            Command::DeletePredictor { name, force } => {
                let removed = self.orchestrator.delete_predictor(&name, force).await?;
                Ok(format!("deleted predictor {} ({})", name, removed.status))
            }
            Command::DeleteDatasource { name } => {
                let removed = self.datasources.delete(&name)?;
                self.logger.log_datasource(&name, "deleted", removed.row_count);
                Ok(format!("deleted datasource {}", name))
            }
        }
    }
}
