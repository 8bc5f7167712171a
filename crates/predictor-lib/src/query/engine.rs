//! Row-level and bulk inference over a predictor's virtual table

use super::predicate::{BulkSource, Condition, QueryShape};
use crate::datasource::DatasourceStore;
use crate::error::{Error, Result};
use crate::integration::IntegrationRegistry;
use crate::models::{
    PredictorRecord, PredictorStatus, ResultSet, Row, RowSet, Value, CONFIDENCE_SUFFIX,
    EXTERNAL_DATASOURCE, SELECT_DATA_QUERY,
};
use crate::observability::EngineMetrics;
use crate::registry::{PredictorHandle, PredictorRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Answers `SELECT` statements against completed predictors
pub struct PredictionQueryEngine {
    registry: Arc<PredictorRegistry>,
    integrations: Arc<IntegrationRegistry>,
    datasources: Arc<DatasourceStore>,
    default_integration: String,
    metrics: EngineMetrics,
}

impl PredictionQueryEngine {
    pub fn new(
        registry: Arc<PredictorRegistry>,
        integrations: Arc<IntegrationRegistry>,
        datasources: Arc<DatasourceStore>,
        default_integration: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            integrations,
            datasources,
            default_integration: default_integration.into(),
            metrics: EngineMetrics::new(),
        }
    }

    /// Run a prediction query; result columns follow the predictor's result schema
    pub async fn query(&self, name: &str, conditions: &[Condition]) -> Result<ResultSet> {
        // Check readiness and classify before doing any I/O.
        let peeked = self.registry.get(name).await?;
        if peeked.status != PredictorStatus::Complete {
            return Err(Error::PredictorNotReady {
                name: name.to_string(),
                status: peeked.status,
            });
        }

        let result = match QueryShape::classify(&peeked, conditions)? {
            QueryShape::Point(row) => {
                let handle = self.pin(&peeked).await?;
                let started = Instant::now();
                let mut result = ResultSet::new(result_columns(handle.record()));
                result.rows.push(predict_row(&handle, &row, None)?);
                self.metrics
                    .observe_inference_latency(started.elapsed().as_secs_f64());
                result
            }
            QueryShape::Bulk(source) => {
                let input = self.fetch_bulk(&peeked, &source).await?;
                let handle = self.pin(&peeked).await?;
                let started = Instant::now();
                let mut result = ResultSet::new(result_columns(handle.record()));
                for row in input.iter_rows() {
                    result.rows.push(predict_row(&handle, &row, Some(&source))?);
                }
                self.metrics
                    .observe_inference_latency(started.elapsed().as_secs_f64());
                result
            }
        };

        self.metrics.add_prediction_rows(result.len());
        debug!(predictor = %name, rows = result.len(), "Prediction query answered");
        Ok(result)
    }

    /// Acquire the predictor, making sure it is still the one classified against
    async fn pin(&self, peeked: &PredictorRecord) -> Result<PredictorHandle> {
        // Status never moves back from complete, so a predictor that is not
        // ready here was deleted and created again under the same name.
        let handle = match self.registry.acquire(&peeked.name).await {
            Err(Error::PredictorNotReady { .. }) => {
                return Err(Error::NotFound(peeked.name.clone()))
            }
            other => other?,
        };
        if handle.record().generation != peeked.generation {
            return Err(Error::NotFound(peeked.name.clone()));
        }
        Ok(handle)
    }

    async fn fetch_bulk(&self, record: &PredictorRecord, source: &BulkSource) -> Result<RowSet> {
        match source {
            BulkSource::SelectDataQuery(query) => {
                let integration = record
                    .source
                    .integration()
                    .unwrap_or(&self.default_integration);
                self.integrations.fetch(integration, query).await
            }
            BulkSource::ExternalDatasource(name) => self.datasources.rows(name).await,
        }
    }
}

fn result_columns(record: &PredictorRecord) -> Vec<String> {
    record
        .result_schema()
        .names()
        .map(str::to_string)
        .collect()
}

/// Infer one input row and lay it out in result-schema order
fn predict_row(
    handle: &PredictorHandle,
    input: &Row,
    bulk: Option<&BulkSource>,
) -> Result<Vec<Value>> {
    let record = handle.record();
    let features = input
        .iter()
        .filter(|(column, _)| !record.is_target(column))
        .fold(Row::new(), |row, (column, value)| {
            row.with(column, value.clone())
        });

    let predictions = handle.model().infer(&features)?;
    if predictions.len() != record.predict.len() {
        return Err(Error::Inference(format!(
            "model returned {} values for {} target columns",
            predictions.len(),
            record.predict.len()
        )));
    }

    let schema = record.result_schema();
    let mut values = Vec::with_capacity(schema.len());
    for (column, ty) in &schema.columns {
        let value = if let Some(i) = record.predict.iter().position(|t| t == column) {
            predictions[i].value.coerce(*ty)
        } else if let Some(i) = column
            .strip_suffix(CONFIDENCE_SUFFIX)
            .and_then(|t| record.predict.iter().position(|p| p == t))
        {
            Value::Float(predictions[i].confidence)
        } else if column == SELECT_DATA_QUERY {
            match bulk {
                Some(BulkSource::SelectDataQuery(q)) => Value::Text(q.clone()),
                _ => Value::Null,
            }
        } else if column == EXTERNAL_DATASOURCE {
            match bulk {
                Some(BulkSource::ExternalDatasource(d)) => Value::Text(d.clone()),
                _ => Value::Null,
            }
        } else {
            features.get(column).cloned().unwrap_or(Value::Null)
        };
        values.push(value);
    }
    Ok(values)
}
