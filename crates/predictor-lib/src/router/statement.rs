//! Parsed statement shapes handed over by the SQL front-end

use crate::models::{ResultSet, Value};
use crate::query::Condition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Possibly schema-qualified table reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Split `schema.table`; only the first dot separates
    pub fn parse(text: &str) -> Self {
        match text.trim().split_once('.') {
            Some((schema, name)) => Self::qualified(unquote(schema), unquote(name)),
            None => Self::new(unquote(text.trim())),
        }
    }
}

fn unquote(ident: &str) -> String {
    ident.trim_matches(|c| c == '`' || c == '"').to_string()
}

impl From<String> for TableRef {
    fn from(text: String) -> Self {
        TableRef::parse(&text)
    }
}

impl From<&str> for TableRef {
    fn from(text: &str) -> Self {
        TableRef::parse(text)
    }
}

impl From<TableRef> for String {
    fn from(table: TableRef) -> Self {
        table.to_string()
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A statement already recognized by the SQL front-end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Statement {
    /// `INSERT INTO t [(columns)] VALUES (values)`
    Insert {
        table: TableRef,
        #[serde(default)]
        columns: Vec<String>,
        values: Vec<Value>,
    },
    /// `SELECT projection FROM t [WHERE filter]`
    Select {
        table: TableRef,
        #[serde(default)]
        projection: Vec<String>,
        #[serde(default, rename = "where")]
        filter: Vec<Condition>,
    },
    /// `DELETE FROM t [WHERE filter]`
    Delete {
        table: TableRef,
        #[serde(default, rename = "where")]
        filter: Vec<Condition>,
    },
}

impl Statement {
    pub fn table(&self) -> &TableRef {
        match self {
            Statement::Insert { table, .. }
            | Statement::Select { table, .. }
            | Statement::Delete { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Insert { .. } => "insert",
            Statement::Select { .. } => "select",
            Statement::Delete { .. } => "delete",
        }
    }

    pub fn insert(table: impl Into<TableRef>, columns: &[&str], values: Vec<Value>) -> Self {
        Statement::Insert {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            values,
        }
    }

    pub fn select(table: impl Into<TableRef>, filter: Vec<Condition>) -> Self {
        Statement::Select {
            table: table.into(),
            projection: Vec::new(),
            filter,
        }
    }

    pub fn delete(table: impl Into<TableRef>, filter: Vec<Condition>) -> Self {
        Statement::Delete {
            table: table.into(),
            filter,
        }
    }
}

/// Which table a statement is aimed at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VirtualTable {
    Predictors,
    Commands,
    PredictorResult(String),
    /// Not ours; the front-end executes it unchanged
    Passthrough,
}

/// What the front-end should return to the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatementOutcome {
    Rows(ResultSet),
    Affected { count: usize },
    Passthrough,
}

impl StatementOutcome {
    pub fn rows(&self) -> Option<&ResultSet> {
        match self {
            StatementOutcome::Rows(rows) => Some(rows),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_ref_parse() {
        assert_eq!(TableRef::parse("predictors"), TableRef::new("predictors"));
        assert_eq!(
            TableRef::parse("mindsdb.`cars predictor`"),
            TableRef::qualified("mindsdb", "cars predictor")
        );
        assert_eq!(
            TableRef::parse("test_data.cars").to_string(),
            "test_data.cars"
        );
    }

    #[test]
    fn test_statement_from_json() {
        let statement: Statement = serde_json::from_value(json!({
            "kind": "select",
            "table": "mindsdb.cars_predictor",
            "where": [
                {"column": "year", "value": 2017},
                {"column": "transmission", "op": "=", "value": "Manual"}
            ]
        }))
        .unwrap();

        assert_eq!(
            statement,
            Statement::select(
                TableRef::qualified("mindsdb", "cars_predictor"),
                vec![
                    Condition::eq("year", 2017),
                    Condition::eq("transmission", "Manual")
                ]
            )
        );
        assert_eq!(statement.kind(), "select");
    }

    #[test]
    fn test_outcome_json_shape() {
        let outcome = StatementOutcome::Affected { count: 1 };
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"kind": "affected", "count": 1})
        );

        let rows = StatementOutcome::Rows(ResultSet {
            columns: vec!["name".into()],
            rows: vec![vec![Value::Text("cars".into())]],
        });
        assert_eq!(
            serde_json::to_value(&rows).unwrap(),
            json!({"kind": "rows", "columns": ["name"], "rows": [["cars"]]})
        );
    }
}
