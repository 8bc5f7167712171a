use super::*;
use crate::datasource::{DatasourceKind, DatasourcePayload, DatasourceStore};
use crate::health::{components, ComponentStatus, HealthRegistry};
use crate::integration::{IntegrationRegistry, MemoryIntegration};
use crate::models::{PredictorStatus, RowSet, SourceSpec, TrainingOptions, Value};
use crate::observability::StructuredLogger;
use crate::registry::PredictorRegistry;
use crate::training::{BaselineEngine, CreatePredictor, TrainingConfig, TrainingOrchestrator};
use crate::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

struct Fixture {
    log: Arc<CommandLog>,
    registry: Arc<PredictorRegistry>,
    datasources: Arc<DatasourceStore>,
    orchestrator: TrainingOrchestrator,
    health: HealthRegistry,
}

fn rows() -> RowSet {
    RowSet::new(
        vec!["x".into(), "y".into()],
        (0..10)
            .map(|i| vec![Value::Integer(i), Value::Float(i as f64 * 2.0)])
            .collect(),
    )
}

fn fixture() -> Fixture {
    let memory = MemoryIntegration::new("default");
    memory.insert_table("points", rows());
    let integrations = Arc::new(IntegrationRegistry::new());
    integrations.register(Arc::new(memory));

    let registry = Arc::new(PredictorRegistry::new());
    let datasources = Arc::new(DatasourceStore::new(integrations.clone()));
    let orchestrator = TrainingOrchestrator::new(
        registry.clone(),
        datasources.clone(),
        integrations,
        Arc::new(BaselineEngine::new()),
        TrainingConfig::default(),
        StructuredLogger::new("test"),
    );

    Fixture {
        log: Arc::new(CommandLog::new(DEFAULT_LOG_CAPACITY)),
        registry,
        datasources,
        orchestrator,
        health: HealthRegistry::new(),
    }
}

impl Fixture {
    fn consumer(&self) -> CommandConsumer {
        CommandConsumer::new(
            self.log.take_consumer().unwrap(),
            self.orchestrator.clone(),
            self.datasources.clone(),
            self.health.clone(),
            StructuredLogger::new("test"),
        )
    }

    async fn train(&self, name: &str) {
        self.orchestrator
            .create(CreatePredictor {
                name: name.into(),
                predict: vec!["y".into()],
                source: SourceSpec::Query {
                    integration: "default".into(),
                    query: "select * from points".into(),
                },
                options: TrainingOptions {
                    join_learn_process: true,
                    ..TrainingOptions::default()
                },
            })
            .await
            .unwrap();
    }

    async fn run(&self, command: &str) -> CommandEntry {
        let entry = self.log.enqueue(command).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), self.log.wait_processed(entry.seq))
            .await
            .expect("command was not processed");
        self.log.get(entry.seq).await.unwrap()
    }
}

#[tokio::test]
async fn test_delete_predictor_command() {
    let f = fixture();
    f.train("doubler").await;
    assert_eq!(
        f.registry.get("doubler").await.unwrap().status,
        PredictorStatus::Complete
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(f.consumer().run(shutdown_rx));

    let entry = f.run("delete predictor doubler").await;
    assert!(entry.consumed);
    assert_eq!(entry.outcome.as_str(), "succeeded");
    assert_eq!(
        f.registry.get("doubler").await,
        Err(Error::NotFound("doubler".into()))
    );
    assert!(f.registry.table_names().await.is_empty());

    // Deleting again is recorded as a failure, not a crash
    let entry = f.run("delete predictor doubler").await;
    assert_eq!(entry.outcome.as_str(), "failed");
    assert_eq!(entry.outcome.message(), Some("'doubler' not found"));

    // The name can be reused afterwards
    f.train("doubler").await;

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_failures_do_not_block_the_queue() {
    let f = fixture();
    f.train("doubler").await;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let handle = tokio::spawn(f.consumer().run(shutdown_rx));

    let bad = f.log.enqueue("truncate predictors").await.unwrap();
    let good = f.log.enqueue("delete predictor doubler").await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), f.log.wait_processed(good.seq))
        .await
        .unwrap();

    let bad = f.log.get(bad.seq).await.unwrap();
    assert!(bad.consumed);
    assert!(bad.outcome.message().unwrap().contains("unknown verb"));
    assert_eq!(f.log.get(good.seq).await.unwrap().outcome.as_str(), "succeeded");
    assert!(!f.registry.contains("doubler"));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_health_follows_last_command() {
    let f = fixture();
    let mut consumer = f.consumer();

    assert!(f.log.take_consumer().is_none());

    let entry = f.log.enqueue("delete predictor missing").await.unwrap();
    let outcome = consumer.process(entry).await;
    assert_eq!(outcome.as_str(), "failed");
    let health = f.health.health().await;
    assert_eq!(
        health.components[components::COMMAND_CONSUMER].status,
        ComponentStatus::Degraded
    );

    f.datasources
        .save(
            "points_file",
            DatasourceKind::File,
            DatasourcePayload::Rows { rows: rows() },
        )
        .await
        .unwrap();
    let entry = f.log.enqueue("delete datasource points_file").await.unwrap();
    let outcome = consumer.process(entry).await;
    assert_eq!(outcome.as_str(), "succeeded");
    assert!(f.datasources.is_empty());
    let health = f.health.health().await;
    assert_eq!(
        health.components[components::COMMAND_CONSUMER].status,
        ComponentStatus::Healthy
    );
}

#[tokio::test]
async fn test_delete_while_training_needs_force() {
    let f = fixture();
    f.orchestrator
        .submit(CreatePredictor {
            name: "slow".into(),
            predict: vec!["y".into()],
            source: SourceSpec::Query {
                integration: "default".into(),
                query: "select * from points".into(),
            },
            options: TrainingOptions::default(),
        })
        .unwrap();

    let mut consumer = f.consumer();
    let entry = f.log.enqueue("delete predictor slow").await.unwrap();
    let outcome = consumer.process(entry).await;
    // The job may already be done on a fast machine
    match f.registry.get("slow").await {
        Ok(record) if !record.status.is_terminal() => {
            assert!(outcome.message().unwrap().contains("still training"))
        }
        _ => {}
    }

    let entry = f.log.enqueue("delete predictor slow force").await.unwrap();
    consumer.process(entry).await;
    assert!(!f.registry.contains("slow"));
}
