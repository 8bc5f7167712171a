//! WHERE-clause conditions and prediction query shapes

use crate::error::{Error, Result};
use crate::models::{
    PredictorRecord, Row, Value, EXTERNAL_DATASOURCE, SELECT_DATA_QUERY,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Comparison operator of a condition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[default]
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    LtEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    GtEq,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
        })
    }
}

/// One `column <op> literal` term of a conjunctive WHERE clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    #[serde(default)]
    pub op: Operator,
    pub value: Value,
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op: Operator::Eq,
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Value::Text(s) => write!(f, "{} {} '{}'", self.column, self.op, s),
            v => write!(f, "{} {} {}", self.column, self.op, v),
        }
    }
}

/// Where bulk input rows come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkSource {
    SelectDataQuery(String),
    ExternalDatasource(String),
}

/// A prediction query after classifying its predicate
#[derive(Debug, Clone, PartialEq)]
pub enum QueryShape {
    /// One feature row assembled from the equality conditions
    Point(Row),
    /// Input rows fetched from a query or datasource
    Bulk(BulkSource),
}

impl QueryShape {
    /// Classify `conditions` against the result schema of `record`
    pub fn classify(record: &PredictorRecord, conditions: &[Condition]) -> Result<Self> {
        if conditions.is_empty() {
            return Err(unsupported(format!(
                "query on '{}' needs a WHERE clause with column values, {} or {}",
                record.name, SELECT_DATA_QUERY, EXTERNAL_DATASOURCE
            )));
        }
        if let Some(c) = conditions.iter().find(|c| c.op != Operator::Eq) {
            return Err(unsupported(format!("only '=' is supported, got '{}'", c)));
        }

        let bulk: Vec<&Condition> = conditions
            .iter()
            .filter(|c| c.column == SELECT_DATA_QUERY || c.column == EXTERNAL_DATASOURCE)
            .collect();
        match bulk.as_slice() {
            [] => {}
            [single] => {
                if conditions.len() > 1 {
                    return Err(unsupported(format!(
                        "{} cannot be combined with other conditions",
                        single.column
                    )));
                }
                let Value::Text(text) = &single.value else {
                    return Err(unsupported(format!("{} must be a string", single.column)));
                };
                return Ok(QueryShape::Bulk(if single.column == SELECT_DATA_QUERY {
                    BulkSource::SelectDataQuery(text.clone())
                } else {
                    BulkSource::ExternalDatasource(text.clone())
                }));
            }
            _ => {
                return Err(unsupported(format!(
                    "use either {} or {}, once",
                    SELECT_DATA_QUERY, EXTERNAL_DATASOURCE
                )))
            }
        }

        let schema = record.source_schema.clone().unwrap_or_default();
        let mut row = Row::new();
        for condition in conditions {
            let column = condition.column.as_str();
            if record.is_target(column) {
                return Err(unsupported(format!(
                    "cannot filter on predicted column '{}'",
                    column
                )));
            }
            if record.is_confidence_column(column) {
                return Err(unsupported(format!(
                    "cannot filter on confidence column '{}'",
                    column
                )));
            }
            let Some(ty) = schema.column_type(column) else {
                return Err(unsupported(format!(
                    "'{}' is not a column of '{}'",
                    column, record.name
                )));
            };
            let value = condition.value.coerce(ty);
            if value.is_null() && !condition.value.is_null() {
                return Err(unsupported(format!(
                    "'{}' is not a valid {} value for '{}'",
                    condition.value, ty, column
                )));
            }
            if let Some(existing) = row.get(column) {
                if !existing.loosely_equals(&value) {
                    return Err(unsupported(format!(
                        "conflicting conditions on '{}'",
                        column
                    )));
                }
            }
            row.insert(column, value);
        }
        Ok(QueryShape::Point(row))
    }
}

fn unsupported(message: String) -> Error {
    Error::UnsupportedPredicate(message)
}
