//! Predictor-related CLI commands

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tabled::Tabled;

use crate::client::{ApiClient, Condition, Statement, StatementOutcome};
use crate::output::{
    color_status, format_timestamp, print_info, print_success, print_table, OutputFormat,
};

pub const PREDICTORS_TABLE: &str = "predictors";

/// Where training rows come from
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingSource {
    Query(String),
    Datasource(String),
}

impl TrainingSource {
    pub fn from_args(query: Option<String>, datasource: Option<String>) -> Result<Self> {
        match (query, datasource) {
            (Some(q), None) => Ok(TrainingSource::Query(q)),
            (None, Some(d)) => Ok(TrainingSource::Datasource(d)),
            _ => bail!("exactly one of --select-data-query or --external-datasource is required"),
        }
    }
}

/// Row for the predictors table
#[derive(Tabled, Serialize)]
struct PredictorRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Predict")]
    predict: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created_at: String,
    #[tabled(rename = "Error")]
    error: String,
}

/// Build the `INSERT INTO predictors` statement for a training request
pub fn train_statement(
    name: &str,
    predict: &str,
    source: &TrainingSource,
    join: bool,
    stop_after: Option<u64>,
) -> Statement {
    let (source_column, source_value) = match source {
        TrainingSource::Query(q) => ("select_data_query", q),
        TrainingSource::Datasource(d) => ("external_datasource", d),
    };

    let mut options = Map::new();
    if join {
        options.insert("join_learn_process".into(), json!(true));
    }
    if let Some(secs) = stop_after {
        options.insert("stop_training_in_x_seconds".into(), json!(secs));
    }
    let options = if options.is_empty() {
        Value::Null
    } else {
        Value::String(Value::Object(options).to_string())
    };

    Statement::Insert {
        table: PREDICTORS_TABLE.to_string(),
        columns: vec![
            "name".into(),
            "predict".into(),
            source_column.into(),
            "training_options".into(),
        ],
        values: vec![
            json!(name),
            json!(predict),
            json!(source_value),
            options,
        ],
    }
}

/// Create and train a predictor
pub async fn train(
    client: &ApiClient,
    name: &str,
    predict: &str,
    source: TrainingSource,
    join: bool,
    stop_after: Option<u64>,
    format: OutputFormat,
) -> Result<()> {
    let statement = train_statement(name, predict, &source, join, stop_after);
    client.execute(&statement).await?;

    if join {
        // Training already finished; show where it ended up
        return list_predictors(client, Some(name.to_string()), format).await;
    }

    match format {
        OutputFormat::Json => println!("{}", json!({"name": name, "status": "generating"})),
        OutputFormat::Table => {
            print_success(&format!("Predictor {} created", name));
            print_info(&format!("Follow progress with `ptq predictors --name {}`", name));
        }
    }
    Ok(())
}

/// List predictors, optionally a single one
pub async fn list_predictors(
    client: &ApiClient,
    name: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let statement = Statement::Select {
        table: PREDICTORS_TABLE.to_string(),
        projection: Vec::new(),
        conditions: name
            .map(|n| vec![Condition::new("name", n)])
            .unwrap_or_default(),
    };

    let (columns, rows) = match client.execute(&statement).await? {
        StatementOutcome::Rows { columns, rows } => (columns, rows),
        other => bail!("unexpected response to predictors query: {:?}", other),
    };

    let cell = |row: &[Value], column: &str| -> String {
        columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| row.get(i))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let predictors: Vec<PredictorRow> = rows
        .iter()
        .map(|row| {
            let query = cell(row, "select_data_query");
            let source = if query.is_empty() {
                format!("datasource {}", cell(row, "external_datasource"))
            } else {
                query
            };
            let status = cell(row, "status");
            PredictorRow {
                name: cell(row, "name"),
                predict: cell(row, "predict"),
                source,
                status: match format {
                    OutputFormat::Table => color_status(&status),
                    OutputFormat::Json => status,
                },
                created_at: format_timestamp(&cell(row, "created_at")),
                error: cell(row, "error"),
            }
        })
        .collect();

    print_table(&predictors, format);
    Ok(())
}
