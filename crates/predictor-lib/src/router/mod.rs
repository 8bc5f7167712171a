//! SQL statement router
//!
//! The only component coupled to the SQL front-end. It decides which
//! virtual table a parsed statement targets and dispatches it; every shape
//! it does not recognize is handed back as [`StatementOutcome::Passthrough`].

mod statement;

pub use statement::{Statement, StatementOutcome, TableRef, VirtualTable};

use crate::commands::{Command, CommandEntry, CommandLog};
use crate::error::{Error, Result};
use crate::models::{
    parse_predict_columns, PredictorRecord, ResultSet, SourceSpec, TrainingOptions, Value,
    EXTERNAL_DATASOURCE, SELECT_DATA_QUERY,
};
use crate::observability::EngineMetrics;
use crate::query::{Condition, Operator, PredictionQueryEngine};
use crate::registry::PredictorRegistry;
use crate::training::{CreatePredictor, TrainingOrchestrator};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PREDICTORS_TABLE: &str = "predictors";
pub const COMMANDS_TABLE: &str = "commands";

/// Columns of the `predictors` table, in order
pub const PREDICTOR_COLUMNS: [&str; 8] = [
    "name",
    "predict",
    SELECT_DATA_QUERY,
    EXTERNAL_DATASOURCE,
    "training_options",
    "status",
    "created_at",
    "error",
];

/// Columns accepted by `INSERT INTO predictors` without a column list
const INSERTABLE_COLUMNS: [&str; 5] = [
    "name",
    "predict",
    SELECT_DATA_QUERY,
    EXTERNAL_DATASOURCE,
    "training_options",
];

/// Columns of the `commands` table as seen by administrative selects
pub const COMMAND_COLUMNS: [&str; 6] = [
    "seq",
    "command",
    "enqueued_at",
    "consumed",
    "outcome",
    "message",
];

/// Dispatches statements to the registry, command log and query engine
pub struct StatementRouter {
    virtual_database: String,
    default_integration: String,
    registry: Arc<PredictorRegistry>,
    orchestrator: TrainingOrchestrator,
    commands: Arc<CommandLog>,
    query: Arc<PredictionQueryEngine>,
    metrics: EngineMetrics,
}

impl StatementRouter {
    pub fn new(
        virtual_database: impl Into<String>,
        default_integration: impl Into<String>,
        registry: Arc<PredictorRegistry>,
        orchestrator: TrainingOrchestrator,
        commands: Arc<CommandLog>,
        query: Arc<PredictionQueryEngine>,
    ) -> Self {
        Self {
            virtual_database: virtual_database.into(),
            default_integration: default_integration.into(),
            registry,
            orchestrator,
            commands,
            query,
            metrics: EngineMetrics::new(),
        }
    }

    pub fn virtual_database(&self) -> &str {
        &self.virtual_database
    }

    /// Identify the table a reference points at
    pub fn classify(&self, table: &TableRef) -> VirtualTable {
        if let Some(schema) = &table.schema {
            if !schema.eq_ignore_ascii_case(&self.virtual_database) {
                return VirtualTable::Passthrough;
            }
        }
        if table.name.eq_ignore_ascii_case(PREDICTORS_TABLE) {
            VirtualTable::Predictors
        } else if table.name.eq_ignore_ascii_case(COMMANDS_TABLE) {
            VirtualTable::Commands
        } else if self.registry.contains(&table.name) {
            VirtualTable::PredictorResult(table.name.clone())
        } else {
            VirtualTable::Passthrough
        }
    }

    /// Execute one statement
    pub async fn execute(&self, statement: Statement) -> Result<StatementOutcome> {
        let target = self.classify(statement.table());
        debug!(
            kind = statement.kind(),
            table = %statement.table(),
            target = ?target,
            "Routing statement"
        );

        let result = self.dispatch(target, statement).await;
        if let Err(e) = &result {
            self.metrics.inc_statement_errors(e.code());
            if !e.is_client_error() {
                warn!(error = %e, "Statement failed");
            }
        }
        result
    }

    async fn dispatch(
        &self,
        target: VirtualTable,
        statement: Statement,
    ) -> Result<StatementOutcome> {
        match (target, statement) {
            (VirtualTable::Predictors, Statement::Insert { columns, values, .. }) => {
                self.insert_predictor(&columns, values).await
            }
            (VirtualTable::Predictors, Statement::Select { projection, filter, .. }) => {
                let rows = self.predictors_table().await;
                Ok(StatementOutcome::Rows(
                    filter_rows(rows, &filter)?.project(&projection)?,
                ))
            }
            (VirtualTable::Predictors, Statement::Delete { filter, .. }) => {
                match single_name(&filter) {
                    Some(name) => {
                        self.orchestrator.delete_predictor(name, false).await?;
                        Ok(StatementOutcome::Affected { count: 1 })
                    }
                    None => Ok(StatementOutcome::Passthrough),
                }
            }
            (VirtualTable::Commands, Statement::Insert { columns, values, .. }) => {
                let entry = self.enqueue_command(&columns, values).await?;
                debug!(seq = entry.seq, "Command accepted");
                Ok(StatementOutcome::Affected { count: 1 })
            }
            (VirtualTable::Commands, Statement::Select { projection, filter, .. }) => {
                let rows = self.commands_table().await;
                Ok(StatementOutcome::Rows(
                    filter_rows(rows, &filter)?.project(&projection)?,
                ))
            }
            (VirtualTable::PredictorResult(name), Statement::Select { projection, filter, .. }) => {
                let rows = self.query.query(&name, &filter).await?;
                Ok(StatementOutcome::Rows(rows.project(&projection)?))
            }
            _ => Ok(StatementOutcome::Passthrough),
        }
    }

    /// Tables of the virtual database: the two system tables plus one per
    /// completed predictor
    pub async fn list_tables(&self) -> Vec<String> {
        let mut tables = vec![COMMANDS_TABLE.to_string(), PREDICTORS_TABLE.to_string()];
        tables.extend(self.registry.table_names().await);
        tables.sort();
        tables
    }

    async fn insert_predictor(
        &self,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<StatementOutcome> {
        let bindings = bind(columns, values, &INSERTABLE_COLUMNS, PREDICTORS_TABLE)?;
        let text = |column: &str| -> Result<Option<String>> {
            match bindings.iter().find(|(c, _)| c == column).map(|(_, v)| v) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::Text(s)) if s.trim().is_empty() => Ok(None),
                Some(Value::Text(s)) => Ok(Some(s.clone())),
                Some(other) => Err(Error::InvalidStatement(format!(
                    "{} must be a string, got {}",
                    column, other
                ))),
            }
        };

        let name = text("name")?
            .ok_or_else(|| Error::InvalidStatement("name is required".to_string()))?;
        if name.eq_ignore_ascii_case(PREDICTORS_TABLE) || name.eq_ignore_ascii_case(COMMANDS_TABLE) {
            return Err(Error::InvalidStatement(format!(
                "'{}' is a reserved table name",
                name
            )));
        }
        let predict = text("predict")?
            .ok_or_else(|| Error::InvalidStatement("predict is required".to_string()))?;

        let source = match (text(SELECT_DATA_QUERY)?, text(EXTERNAL_DATASOURCE)?) {
            (Some(query), None) => SourceSpec::Query {
                integration: self.default_integration.clone(),
                query,
            },
            (None, Some(datasource)) => SourceSpec::Datasource { name: datasource },
            _ => {
                return Err(Error::InvalidStatement(format!(
                    "exactly one of {} or {} is required",
                    SELECT_DATA_QUERY, EXTERNAL_DATASOURCE
                )))
            }
        };
        let options = match text("training_options")? {
            Some(options) => TrainingOptions::parse(&options)?,
            None => TrainingOptions::default(),
        };

        self.orchestrator
            .create(CreatePredictor {
                name,
                predict: parse_predict_columns(&predict)?,
                source,
                options,
            })
            .await?;
        Ok(StatementOutcome::Affected { count: 1 })
    }

    async fn enqueue_command(
        &self,
        columns: &[String],
        values: Vec<Value>,
    ) -> Result<CommandEntry> {
        let bindings = bind(columns, values, &["command"], COMMANDS_TABLE)?;
        let text = match bindings.into_iter().next() {
            Some((_, Value::Text(text))) => text,
            _ => {
                return Err(Error::InvalidStatement(
                    "command must be a string".to_string(),
                ))
            }
        };
        // Reject what the consumer could never run while the caller is still here
        Command::parse(&text)?;
        self.commands.enqueue(&text).await
    }

    async fn predictors_table(&self) -> ResultSet {
        let mut result = ResultSet::new(PREDICTOR_COLUMNS.iter().map(|c| c.to_string()).collect());
        for record in self.registry.list().await {
            result.rows.push(predictor_row(&record));
        }
        result
    }

    async fn commands_table(&self) -> ResultSet {
        let mut result = ResultSet::new(COMMAND_COLUMNS.iter().map(|c| c.to_string()).collect());
        for entry in self.commands.entries().await {
            result.rows.push(vec![
                Value::Integer(entry.seq as i64),
                Value::Text(entry.command.clone()),
                Value::Text(entry.enqueued_at.to_rfc3339()),
                Value::Boolean(entry.consumed),
                Value::Text(entry.outcome.as_str().to_string()),
                entry
                    .outcome
                    .message()
                    .map(|m| Value::Text(m.to_string()))
                    .unwrap_or(Value::Null),
            ]);
        }
        result
    }
}

fn predictor_row(record: &PredictorRecord) -> Vec<Value> {
    let text = |s: Option<&str>| s.map(|s| Value::Text(s.to_string())).unwrap_or(Value::Null);
    vec![
        Value::Text(record.name.clone()),
        Value::Text(record.predict.join(",")),
        text(record.source.select_data_query()),
        text(record.source.external_datasource()),
        Value::Text(record.options.to_text()),
        Value::Text(record.status.to_string()),
        Value::Text(record.created_at.to_rfc3339()),
        text(record.error.as_deref()),
    ]
}

/// Pair insert values with column names, positionally when no list is given
fn bind(
    columns: &[String],
    values: Vec<Value>,
    allowed: &[&str],
    table: &str,
) -> Result<Vec<(String, Value)>> {
    let columns: Vec<String> = if columns.is_empty() {
        if values.len() > allowed.len() {
            return Err(Error::InvalidStatement(format!(
                "{} accepts at most {} values",
                table,
                allowed.len()
            )));
        }
        allowed.iter().map(|c| c.to_string()).collect()
    } else {
        columns.iter().map(|c| c.to_ascii_lowercase()).collect()
    };

    if values.len() > columns.len() {
        return Err(Error::InvalidStatement(format!(
            "{} values for {} columns",
            values.len(),
            columns.len()
        )));
    }
    if let Some(unknown) = columns.iter().find(|c| !allowed.contains(&c.as_str())) {
        return Err(Error::InvalidStatement(format!(
            "cannot insert into column '{}' of {}",
            unknown, table
        )));
    }
    // Columns without a value stay unbound and read as NULL
    Ok(columns.into_iter().zip(values).collect())
}

/// `WHERE name = '<n>'` and nothing else
fn single_name(filter: &[Condition]) -> Option<&str> {
    match filter {
        [Condition {
            column,
            op: Operator::Eq,
            value: Value::Text(name),
        }] if column.eq_ignore_ascii_case("name") => Some(name.as_str()),
        _ => None,
    }
}

/// Equality filtering over a system table
fn filter_rows(mut rows: ResultSet, filter: &[Condition]) -> Result<ResultSet> {
    let mut predicates = Vec::with_capacity(filter.len());
    for condition in filter {
        if condition.op != Operator::Eq {
            return Err(Error::UnsupportedPredicate(format!(
                "only '=' is supported, got '{}'",
                condition
            )));
        }
        let index = rows
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(&condition.column))
            .ok_or_else(|| {
                Error::InvalidStatement(format!("unknown column '{}'", condition.column))
            })?;
        predicates.push((index, &condition.value));
    }
    rows.rows.retain(|row| {
        predicates
            .iter()
            .all(|(i, value)| row[*i].loosely_equals(value))
    });
    Ok(rows)
}
