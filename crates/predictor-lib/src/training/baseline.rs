//! Built-in nearest-neighbour learning engine
//!
//! Used when no external engine is configured. Numeric distances are scaled
//! by the observed column range, categorical columns contribute 0 or 1.
//! Numeric targets take the neighbour mean, categorical targets the majority.

use super::{LearningEngine, Prediction, TrainRequest, TrainedModel};
use crate::error::{Error, Result};
use crate::models::{ColumnType, Row, Value};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default number of neighbours consulted per prediction
pub const DEFAULT_NEIGHBOURS: usize = 5;

/// Rows fitted between cooperative yields
const YIELD_EVERY: usize = 256;

/// Training option overriding the neighbour count
const NEIGHBOURS_OPTION: &str = "neighbours";

#[derive(Debug, Clone)]
struct FeatureColumn {
    name: String,
    ty: ColumnType,
    min: f64,
    max: f64,
}

impl FeatureColumn {
    fn range(&self) -> f64 {
        (self.max - self.min).abs()
    }

    fn distance(&self, a: &Value, b: &Value) -> f64 {
        if b.is_null() {
            return 1.0;
        }
        if self.ty.is_numeric() {
            if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
                let range = self.range();
                return if range > 0.0 {
                    ((x - y).abs() / range).min(1.0)
                } else if (x - y).abs() < f64::EPSILON {
                    0.0
                } else {
                    1.0
                };
            }
        }
        if a.loosely_equals(b) {
            0.0
        } else {
            1.0
        }
    }
}

#[derive(Debug, Clone)]
struct Sample {
    features: Vec<Value>,
    targets: Vec<Value>,
}

/// Nearest-neighbour model over the training rows
#[derive(Debug)]
pub struct BaselineModel {
    features: Vec<FeatureColumn>,
    targets: Vec<(String, ColumnType)>,
    samples: Vec<Sample>,
    neighbours: usize,
    partial: bool,
}

impl BaselineModel {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn row_distance(&self, row: &Row, sample: &Sample) -> f64 {
        let mut total = 0.0;
        let mut compared = 0usize;
        for (feature, stored) in self.features.iter().zip(sample.features.iter()) {
            match row.get(&feature.name) {
                Some(value) if !value.is_null() => {
                    total += feature.distance(value, stored);
                    compared += 1;
                }
                _ => {}
            }
        }
        if compared == 0 {
            0.0
        } else {
            total / compared as f64
        }
    }
}

impl TrainedModel for BaselineModel {
    fn infer(&self, row: &Row) -> Result<Vec<Prediction>> {
        if self.samples.is_empty() {
            return Err(Error::Inference("model has no samples".to_string()));
        }

        let mut ranked: Vec<(f64, &Sample)> = self
            .samples
            .iter()
            .map(|s| (self.row_distance(row, s), s))
            .collect();
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
        let nearest: Vec<&Sample> = ranked
            .into_iter()
            .take(self.neighbours.max(1))
            .map(|(_, s)| s)
            .collect();

        Ok(self
            .targets
            .iter()
            .enumerate()
            .map(|(idx, (_, ty))| {
                let values: Vec<&Value> = nearest
                    .iter()
                    .map(|s| &s.targets[idx])
                    .filter(|v| !v.is_null())
                    .collect();
                if ty.is_numeric() {
                    numeric_prediction(&values)
                } else {
                    majority_prediction(&values)
                }
            })
            .collect())
    }

    fn is_partial(&self) -> bool {
        self.partial
    }
}

fn numeric_prediction(values: &[&Value]) -> Prediction {
    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    if numbers.is_empty() {
        return Prediction {
            value: Value::Null,
            confidence: 0.0,
        };
    }
    let mean = numbers.iter().sum::<f64>() / numbers.len() as f64;
    let variance = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / numbers.len() as f64;
    let spread = variance.sqrt() / mean.abs().max(f64::EPSILON);
    Prediction {
        value: Value::Float(mean),
        confidence: 1.0 / (1.0 + spread),
    }
}

fn majority_prediction(values: &[&Value]) -> Prediction {
    // Ties go to the value seen first, i.e. the closest neighbour
    let mut counts: Vec<(&Value, usize)> = Vec::new();
    for &value in values {
        match counts.iter_mut().find(|(v, _)| v.loosely_equals(value)) {
            Some(entry) => entry.1 += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(&Value, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((value, count));
        }
    }
    match best {
        Some((value, count)) => Prediction {
            value: value.clone(),
            confidence: count as f64 / values.len() as f64,
        },
        None => Prediction {
            value: Value::Null,
            confidence: 0.0,
        },
    }
}

/// Default learning engine
#[derive(Debug, Clone)]
pub struct BaselineEngine {
    neighbours: usize,
}

impl Default for BaselineEngine {
    fn default() -> Self {
        Self {
            neighbours: DEFAULT_NEIGHBOURS,
        }
    }
}

impl BaselineEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_neighbours(neighbours: usize) -> Self {
        Self {
            neighbours: neighbours.max(1),
        }
    }
}

#[async_trait]
impl LearningEngine for BaselineEngine {
    fn name(&self) -> &str {
        "baseline"
    }

    async fn train(
        &self,
        request: TrainRequest,
        cancel: CancellationToken,
    ) -> Result<Arc<dyn TrainedModel>> {
        let neighbours = request
            .options
            .extra
            .get(NEIGHBOURS_OPTION)
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(self.neighbours)
            .max(1);

        let target_indexes = request
            .targets
            .iter()
            .map(|t| {
                request
                    .rows
                    .column_index(t)
                    .ok_or_else(|| Error::TrainingFailed(format!("target column '{}' not in data", t)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut features: Vec<(usize, FeatureColumn)> = request
            .rows
            .columns
            .iter()
            .enumerate()
            .filter(|(i, _)| !target_indexes.contains(i))
            .map(|(i, name)| {
                let ty = request.schema.column_type(name).unwrap_or(ColumnType::Text);
                (
                    i,
                    FeatureColumn {
                        name: name.clone(),
                        ty,
                        min: f64::INFINITY,
                        max: f64::NEG_INFINITY,
                    },
                )
            })
            .collect();

        let mut samples = Vec::with_capacity(request.rows.len());
        let mut partial = false;

        for (n, row) in request.rows.rows.iter().enumerate() {
            if cancel.is_cancelled() {
                partial = true;
                break;
            }
            if n > 0 && n % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }

            let targets: Vec<Value> = target_indexes
                .iter()
                .map(|&i| row.get(i).cloned().unwrap_or(Value::Null))
                .collect();
            if targets.iter().all(Value::is_null) {
                continue;
            }

            let mut values = Vec::with_capacity(features.len());
            for (i, feature) in features.iter_mut() {
                let value = row.get(*i).cloned().unwrap_or(Value::Null);
                if feature.ty.is_numeric() {
                    if let Some(x) = value.as_f64() {
                        feature.min = feature.min.min(x);
                        feature.max = feature.max.max(x);
                    }
                }
                values.push(value);
            }
            samples.push(Sample {
                features: values,
                targets,
            });
        }

        if samples.is_empty() {
            return Err(Error::TrainingFailed(if partial {
                "training cancelled before any rows were fitted".to_string()
            } else {
                "no rows with target values to train on".to_string()
            }));
        }

        debug!(
            predictor = %request.predictor,
            samples = samples.len(),
            partial,
            "Baseline model fitted"
        );

        Ok(Arc::new(BaselineModel {
            features: features.into_iter().map(|(_, f)| f).collect(),
            targets: request
                .targets
                .iter()
                .map(|t| (t.clone(), request.schema.column_type(t).unwrap_or(ColumnType::Text)))
                .collect(),
            samples,
            neighbours,
            partial,
        }))
    }
}
