//! Top-level engine wiring
//!
//! [`PredictorEngine`] owns every component and is what hosts (the HTTP
//! server, tests) talk to. Components are built once by
//! [`PredictorEngineBuilder`] and shared behind `Arc`s.

use crate::commands::{CommandConsumer, CommandLog};
use crate::config::EngineConfig;
use crate::datasource::{DatasourceKind, DatasourceMeta, DatasourcePayload, DatasourceStore};
use crate::error::{Error, Result};
use crate::health::{components, HealthRegistry};
use crate::integration::{Integration, IntegrationRegistry};
use crate::observability::{EngineMetrics, StructuredLogger};
use crate::query::PredictionQueryEngine;
use crate::registry::PredictorRegistry;
use crate::router::{Statement, StatementOutcome, StatementRouter};
use crate::training::{BaselineEngine, LearningEngine, TrainingOrchestrator};
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Builder for [`PredictorEngine`]
pub struct PredictorEngineBuilder {
    config: EngineConfig,
    learning_engine: Option<Arc<dyn LearningEngine>>,
    integrations: Vec<Arc<dyn Integration>>,
    health: Option<HealthRegistry>,
}

impl PredictorEngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            learning_engine: None,
            integrations: Vec::new(),
            health: None,
        }
    }

    /// Learning engine used for every predictor; defaults to [`BaselineEngine`]
    pub fn learning_engine(mut self, engine: Arc<dyn LearningEngine>) -> Self {
        self.learning_engine = Some(engine);
        self
    }

    pub fn integration(mut self, integration: Arc<dyn Integration>) -> Self {
        self.integrations.push(integration);
        self
    }

    /// Share an existing health table instead of creating one
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub async fn build(self) -> Result<PredictorEngine> {
        self.config.validate()?;
        let config = self.config;
        let logger = StructuredLogger::new(&config.instance_name);

        let integrations = Arc::new(IntegrationRegistry::new());
        for integration in self.integrations {
            integrations.register(integration);
        }

        if let Some(dir) = &config.data_dir {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create data dir {}", dir.display()))?;
        }
        let datasources = Arc::new(match config.datasource_dir() {
            Some(dir) => DatasourceStore::open(dir, integrations.clone())?,
            None => DatasourceStore::new(integrations.clone()),
        });
        let commands = Arc::new(match config.command_log_path() {
            Some(path) => CommandLog::open(path, config.command_log_capacity)?,
            None => CommandLog::new(config.command_log_capacity),
        });

        let registry = Arc::new(PredictorRegistry::new());
        let learning_engine = self
            .learning_engine
            .unwrap_or_else(|| Arc::new(BaselineEngine::new()));
        let orchestrator = TrainingOrchestrator::new(
            registry.clone(),
            datasources.clone(),
            integrations.clone(),
            learning_engine,
            config.training_config(),
            logger.clone(),
        );
        let query = Arc::new(PredictionQueryEngine::new(
            registry.clone(),
            integrations.clone(),
            datasources.clone(),
            config.default_integration.clone(),
        ));
        let router = StatementRouter::new(
            config.virtual_database.clone(),
            config.default_integration.clone(),
            registry.clone(),
            orchestrator.clone(),
            commands.clone(),
            query,
        );

        let health = self.health.unwrap_or_default();
        health.register_all().await;

        info!(
            virtual_database = %config.virtual_database,
            learning_engine = orchestrator.engine_name(),
            integrations = ?integrations.names(),
            datasources = datasources.len(),
            persistent = config.data_dir.is_some(),
            "Predictor engine initialized"
        );

        Ok(PredictorEngine {
            config,
            registry,
            integrations,
            datasources,
            orchestrator,
            commands,
            router,
            health,
            metrics: EngineMetrics::new(),
            logger,
        })
    }
}

/// The predictive-tables engine
pub struct PredictorEngine {
    config: EngineConfig,
    registry: Arc<PredictorRegistry>,
    integrations: Arc<IntegrationRegistry>,
    datasources: Arc<DatasourceStore>,
    orchestrator: TrainingOrchestrator,
    commands: Arc<CommandLog>,
    router: StatementRouter,
    health: HealthRegistry,
    metrics: EngineMetrics,
    logger: StructuredLogger,
}

impl PredictorEngine {
    pub fn builder(config: EngineConfig) -> PredictorEngineBuilder {
        PredictorEngineBuilder::new(config)
    }

    /// Start the background consumer of the `commands` table
    ///
    /// Only one consumer may exist per engine.
    pub fn spawn_command_consumer(
        &self,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>> {
        let cursor = self
            .commands
            .take_consumer()
            .ok_or_else(|| Error::AlreadyExists("command consumer".to_string()))?;
        let consumer = CommandConsumer::new(
            cursor,
            self.orchestrator.clone(),
            self.datasources.clone(),
            self.health.clone(),
            self.logger.clone(),
        );
        Ok(tokio::spawn(consumer.run(shutdown)))
    }

    /// Execute a statement against the virtual database
    pub async fn execute(&self, statement: Statement) -> Result<StatementOutcome> {
        let outcome = self.router.execute(statement).await;
        self.refresh_predictor_gauge().await;
        outcome
    }

    pub async fn list_tables(&self) -> Vec<String> {
        self.router.list_tables().await
    }

    pub async fn save_datasource(
        &self,
        name: &str,
        kind: DatasourceKind,
        payload: DatasourcePayload,
    ) -> Result<DatasourceMeta> {
        match self.datasources.save(name, kind, payload).await {
            Ok(meta) => {
                self.logger.log_datasource(name, "saved", meta.row_count);
                self.health.set_healthy(components::DATASOURCES).await;
                Ok(meta)
            }
            Err(e) => {
                if let Error::Storage(msg) = &e {
                    self.health
                        .set_degraded(components::DATASOURCES, msg.clone())
                        .await;
                }
                Err(e)
            }
        }
    }

    pub fn delete_datasource(&self, name: &str) -> Result<DatasourceMeta> {
        let meta = self.datasources.delete(name)?;
        self.logger.log_datasource(name, "deleted", meta.row_count);
        Ok(meta)
    }

    async fn refresh_predictor_gauge(&self) {
        let counts = self.registry.status_counts().await;
        self.metrics.set_predictor_counts(&counts);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PredictorRegistry> {
        &self.registry
    }

    pub fn integrations(&self) -> &Arc<IntegrationRegistry> {
        &self.integrations
    }

    pub fn datasources(&self) -> &Arc<DatasourceStore> {
        &self.datasources
    }

    pub fn orchestrator(&self) -> &TrainingOrchestrator {
        &self.orchestrator
    }

    pub fn commands(&self) -> &Arc<CommandLog> {
        &self.commands
    }

    pub fn router(&self) -> &StatementRouter {
        &self.router
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::MemoryIntegration;
    use crate::models::{RowSet, Value};
    use crate::query::Condition;
    use std::time::Duration;
    use tempfile::TempDir;

    fn points() -> RowSet {
        RowSet::new(
            vec!["x".into(), "y".into()],
            (0..20)
                .map(|i| vec![Value::Integer(i), Value::Float(i as f64 * 3.0)])
                .collect(),
        )
    }

    async fn build_engine(config: EngineConfig) -> PredictorEngine {
        let memory = MemoryIntegration::new("default");
        memory.insert_table("points", points());
        PredictorEngine::builder(config)
            .integration(Arc::new(memory))
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_build_registers_components() {
        let engine = build_engine(EngineConfig::default()).await;
        let health = engine.health().health().await;
        for name in components::ALL {
            assert!(health.components.contains_key(name), "{}", name);
        }
        assert_eq!(engine.orchestrator().engine_name(), "baseline");
        assert_eq!(engine.list_tables().await, vec!["commands", "predictors"]);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_build() {
        let config = EngineConfig {
            command_log_capacity: 0,
            ..EngineConfig::default()
        };
        let err = PredictorEngine::builder(config).build().await.err().unwrap();
        assert_eq!(err.code(), "invalid_statement");
    }

    #[tokio::test]
    async fn test_single_command_consumer() {
        let engine = build_engine(EngineConfig::default()).await;
        let (tx, _) = broadcast::channel(1);
        let handle = engine.spawn_command_consumer(tx.subscribe()).unwrap();
        assert!(engine.spawn_command_consumer(tx.subscribe()).is_err());

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_datasources_survive_restart() {
        let dir = TempDir::new().unwrap();
        let config = EngineConfig {
            data_dir: Some(dir.path().to_path_buf()),
            ..EngineConfig::default()
        };

        {
            let engine = build_engine(config.clone()).await;
            engine
                .save_datasource(
                    "points_file",
                    DatasourceKind::File,
                    DatasourcePayload::Rows { rows: points() },
                )
                .await
                .unwrap();
            engine
                .execute(Statement::insert(
                    "commands",
                    &["command"],
                    vec![Value::Text("delete datasource points_file".into())],
                ))
                .await
                .unwrap();
        }

        let engine = build_engine(config).await;
        assert_eq!(engine.datasources().get("points_file").unwrap().meta.row_count, 20);
        assert_eq!(engine.commands().pending().await, 1);
    }

    #[tokio::test]
    async fn test_train_and_query_through_engine() {
        let engine = build_engine(EngineConfig::default()).await;
        engine
            .execute(Statement::insert(
                "mindsdb.predictors",
                &["name", "predict", "select_data_query", "training_options"],
                vec![
                    Value::Text("doubler".into()),
                    Value::Text("y".into()),
                    Value::Text("select * from points".into()),
                    Value::Text(r#"{"join_learn_process": true}"#.into()),
                ],
            ))
            .await
            .unwrap();

        let outcome = engine
            .execute(Statement::select(
                "mindsdb.doubler",
                vec![Condition::eq("x", 4)],
            ))
            .await
            .unwrap();
        let rows = outcome.rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows.value(0, "y").unwrap().as_f64().is_some());
    }
}
