//! Prediction queries against a predictor's table

use anyhow::{bail, Context, Result};
use serde_json::Value;

use crate::client::{ApiClient, Condition, Statement, StatementOutcome};
use crate::output::{print_rows, print_warning, OutputFormat};

/// Input rows for a prediction
#[derive(Debug, Clone, PartialEq)]
pub enum PredictInput {
    /// `col=value` pairs forming one feature row
    Point(Vec<String>),
    Query(String),
    Datasource(String),
}

/// Parse `column=value`; numbers and booleans are sent typed, anything else as text
pub fn parse_condition(text: &str) -> Result<Condition> {
    let (column, value) = text
        .split_once('=')
        .with_context(|| format!("expected column=value, got '{}'", text))?;
    let column = column.trim();
    if column.is_empty() {
        bail!("missing column name in '{}'", text);
    }
    Ok(Condition::new(column, parse_literal(value.trim())))
}

fn parse_literal(value: &str) -> Value {
    if let Some(quoted) = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
    {
        return Value::String(quoted.to_string());
    }
    if let Ok(i) = value.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = value.parse::<f64>() {
        return Value::from(f);
    }
    match value.to_ascii_lowercase().as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "null" => Value::Null,
        _ => Value::String(value.to_string()),
    }
}

/// Build the `SELECT` statement for a prediction
pub fn predict_statement(name: &str, input: &PredictInput, columns: Vec<String>) -> Result<Statement> {
    let conditions = match input {
        PredictInput::Point(pairs) => {
            if pairs.is_empty() {
                bail!("at least one --where column=value is required");
            }
            pairs
                .iter()
                .map(|p| parse_condition(p))
                .collect::<Result<Vec<_>>>()?
        }
        PredictInput::Query(q) => vec![Condition::new("select_data_query", q.as_str())],
        PredictInput::Datasource(d) => vec![Condition::new("external_datasource", d.as_str())],
    };

    Ok(Statement::Select {
        table: name.to_string(),
        projection: columns,
        conditions,
    })
}

/// Run a prediction query and print the result rows
pub async fn predict(
    client: &ApiClient,
    name: &str,
    input: PredictInput,
    columns: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let statement = predict_statement(name, &input, columns)?;
    match client.execute(&statement).await? {
        StatementOutcome::Rows { columns, rows } => print_rows(&columns, &rows, format),
        StatementOutcome::Passthrough => {
            print_warning(&format!("'{}' is not a predictor table", name));
        }
        StatementOutcome::Affected { .. } => bail!("unexpected response to prediction query"),
    }
    Ok(())
}
