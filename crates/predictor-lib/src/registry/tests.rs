use super::*;
use crate::error::Error;
use crate::models::{
    ColumnType, PredictorStatus, Row, Schema, SourceSpec, TrainingOptions, Value,
};
use crate::training::{Prediction, TrainedModel};
use std::sync::Arc;
use std::time::Duration;

struct ConstantModel;

impl TrainedModel for ConstantModel {
    fn infer(&self, _row: &Row) -> crate::Result<Vec<Prediction>> {
        Ok(vec![Prediction {
            value: Value::Float(1.0),
            confidence: 1.0,
        }])
    }
}

fn source() -> SourceSpec {
    SourceSpec::Query {
        integration: "default".into(),
        query: "select * from cars".into(),
    }
}

fn schema() -> Schema {
    Schema::new(vec![
        ("year".into(), ColumnType::Integer),
        ("price".into(), ColumnType::Float),
    ])
}

fn create(registry: &PredictorRegistry, name: &str) -> u64 {
    registry
        .create(name, vec!["price".into()], source(), TrainingOptions::default())
        .unwrap()
        .generation
}

async fn complete(registry: &PredictorRegistry, name: &str) {
    let generation = registry.get(name).await.unwrap().generation;
    registry
        .set_status(name, generation, PredictorStatus::Training, None)
        .await
        .unwrap();
    registry
        .complete(name, generation, Arc::new(ConstantModel), schema())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_unknown_name_is_not_found() {
    let registry = PredictorRegistry::new();
    assert_eq!(
        registry.get("ghost").await,
        Err(Error::NotFound("ghost".into()))
    );
    assert!(matches!(
        registry.acquire("ghost").await,
        Err(Error::NotFound(_))
    ));
    assert!(registry.table_names().await.is_empty());
}

#[tokio::test]
async fn test_create_starts_generating_and_rejects_duplicates() {
    let registry = PredictorRegistry::new();
    create(&registry, "cars");

    let record = registry.get("cars").await.unwrap();
    assert_eq!(record.status, PredictorStatus::Generating);
    assert!(record.error.is_none());

    let err = registry
        .create("cars", vec!["price".into()], source(), TrainingOptions::default())
        .unwrap_err();
    assert_eq!(err, Error::DuplicateName("cars".into()));

    // Names are case-sensitive
    create(&registry, "Cars");
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn test_forward_chain_only() {
    let registry = PredictorRegistry::new();
    let generation = create(&registry, "cars");

    let err = registry
        .set_status("cars", generation, PredictorStatus::Complete, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidTransition { .. }));

    registry
        .set_status("cars", generation, PredictorStatus::Training, None)
        .await
        .unwrap();
    registry
        .set_status("cars", generation, PredictorStatus::Error, Some("boom".into()))
        .await
        .unwrap();

    let err = registry
        .set_status("cars", generation, PredictorStatus::Training, None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        Error::InvalidTransition {
            name: "cars".into(),
            from: PredictorStatus::Error,
            to: PredictorStatus::Training,
        }
    );
    assert_eq!(
        registry.get("cars").await.unwrap().error.as_deref(),
        Some("boom")
    );
}

#[tokio::test]
async fn test_table_exists_only_when_complete() {
    let registry = PredictorRegistry::new();
    create(&registry, "cars");

    assert!(matches!(
        registry.acquire("cars").await,
        Err(Error::PredictorNotReady {
            status: PredictorStatus::Generating,
            ..
        })
    ));
    assert!(registry.table_names().await.is_empty());

    complete(&registry, "cars").await;

    assert_eq!(registry.table_names().await, vec!["cars".to_string()]);
    let handle = registry.acquire("cars").await.unwrap();
    assert_eq!(handle.record().status, PredictorStatus::Complete);
    assert!(handle.record().source_schema.is_some());
    let predictions = handle.model().infer(&Row::new()).unwrap();
    assert_eq!(predictions[0].value, Value::Float(1.0));
}

#[tokio::test]
async fn test_delete_requires_force_while_training() {
    let registry = PredictorRegistry::new();
    let generation = create(&registry, "cars");
    registry
        .set_status("cars", generation, PredictorStatus::Training, None)
        .await
        .unwrap();

    assert_eq!(
        registry.delete("cars", false).await,
        Err(Error::TrainingInProgress("cars".into()))
    );

    let removed = registry.delete("cars", true).await.unwrap();
    assert_eq!(removed.status, PredictorStatus::Training);

    // A job writing back after a forced delete finds nothing
    let err = registry
        .complete("cars", generation, Arc::new(ConstantModel), schema())
        .await
        .unwrap_err();
    assert_eq!(err, Error::NotFound("cars".into()));
}

#[tokio::test]
async fn test_writes_from_an_earlier_generation_are_rejected() {
    let registry = PredictorRegistry::new();
    let old = create(&registry, "cars");
    registry
        .set_status("cars", old, PredictorStatus::Training, None)
        .await
        .unwrap();
    registry.delete("cars", true).await.unwrap();

    let new = create(&registry, "cars");
    assert!(new > old);
    registry
        .set_status("cars", new, PredictorStatus::Training, None)
        .await
        .unwrap();

    // The cancelled job of the deleted predictor reports back late
    assert_eq!(
        registry
            .complete("cars", old, Arc::new(ConstantModel), schema())
            .await,
        Err(Error::NotFound("cars".into()))
    );
    assert_eq!(
        registry
            .set_status("cars", old, PredictorStatus::Error, Some("cancelled".into()))
            .await,
        Err(Error::NotFound("cars".into()))
    );

    let record = registry.get("cars").await.unwrap();
    assert_eq!(record.status, PredictorStatus::Training);
    assert!(record.error.is_none());
    assert!(matches!(
        registry.acquire("cars").await,
        Err(Error::PredictorNotReady { .. })
    ));
}

#[tokio::test]
async fn test_delete_is_idempotent_and_name_reusable() {
    let registry = PredictorRegistry::new();
    create(&registry, "cars");
    complete(&registry, "cars").await;

    registry.delete("cars", false).await.unwrap();
    assert_eq!(
        registry.delete("cars", false).await,
        Err(Error::NotFound("cars".into()))
    );
    assert!(registry.is_empty());

    create(&registry, "cars");
    let record = registry.get("cars").await.unwrap();
    assert_eq!(record.status, PredictorStatus::Generating);
    assert!(record.source_schema.is_none());
}

#[tokio::test]
async fn test_delete_waits_for_in_flight_query() {
    let registry = Arc::new(PredictorRegistry::new());
    create(&registry, "cars");
    complete(&registry, "cars").await;

    let handle = registry.acquire("cars").await.unwrap();

    let deleter = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.delete("cars", false).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!deleter.is_finished());
    // Still registered while the query holds its handle
    assert!(registry.contains("cars"));

    drop(handle);
    deleter.await.unwrap().unwrap();
    assert!(matches!(
        registry.acquire("cars").await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn test_list_and_status_counts() {
    let registry = PredictorRegistry::new();
    create(&registry, "a");
    create(&registry, "b");
    complete(&registry, "b").await;

    let names: Vec<String> = registry.list().await.into_iter().map(|r| r.name).collect();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    let counts = registry.status_counts().await;
    assert_eq!(counts[&PredictorStatus::Generating], 1);
    assert_eq!(counts[&PredictorStatus::Complete], 1);
    assert_eq!(counts[&PredictorStatus::Training], 0);
}
