//! Core data models shared by every component

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata column carrying a bulk data-fetch query
pub const SELECT_DATA_QUERY: &str = "select_data_query";

/// Metadata column naming a stored datasource
pub const EXTERNAL_DATASOURCE: &str = "external_datasource";

/// Suffix of the per-target confidence column
pub const CONFIDENCE_SUFFIX: &str = "_confidence";

/// A single SQL scalar value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Column type of this value, `None` for NULL
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    /// Numeric view of the value; text is parsed when it looks numeric
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a boolean flag (`true`, `1`, `"yes"`)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Integer(0) => Some(false),
            Value::Integer(1) => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Convert to the given column type, NULL when no conversion exists
    pub fn coerce(&self, ty: ColumnType) -> Value {
        match (ty, self) {
            (_, Value::Null) => Value::Null,
            (ColumnType::Float, v) => v.as_f64().map(Value::Float).unwrap_or(Value::Null),
            (ColumnType::Integer, v) => v
                .as_f64()
                .map(|f| Value::Integer(f.round() as i64))
                .unwrap_or(Value::Null),
            (ColumnType::Boolean, v) => v.as_bool().map(Value::Boolean).unwrap_or(Value::Null),
            (ColumnType::Text, Value::Text(s)) => Value::Text(s.clone()),
            (ColumnType::Text, v) => Value::Text(v.to_string()),
        }
    }

    /// Loose equality used when matching predicate literals against stored rows
    pub fn loosely_equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Text(a), Value::Text(b)) => a == b,
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
                _ => a.to_string() == b.to_string(),
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Text => "text",
            ColumnType::Boolean => "boolean",
        };
        f.write_str(s)
    }
}

/// Ordered column name -> type mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub columns: Vec<(String, ColumnType)>,
}

impl Schema {
    pub fn new(columns: Vec<(String, ColumnType)>) -> Self {
        Self { columns }
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| *t)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|(n, _)| n == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One input row: ordered column -> value pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    /// Insert or replace a column value
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        let column = column.into();
        let value = value.into();
        match self.values.iter_mut().find(|(c, _)| *c == column) {
            Some(slot) => slot.1 = value,
            None => self.values.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Column-ordered set of rows as returned by an integration or datasource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Materialize row `index` as a named row
    pub fn row(&self, index: usize) -> Option<Row> {
        self.rows.get(index).map(|values| {
            let mut row = Row::new();
            for (column, value) in self.columns.iter().zip(values.iter()) {
                row.insert(column.clone(), value.clone());
            }
            row
        })
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = Row> + '_ {
        (0..self.rows.len()).filter_map(move |i| self.row(i))
    }

    /// Infer column types from the first non-null value per column.
    /// Integer columns that also contain floats widen to float.
    pub fn infer_schema(&self) -> Schema {
        let columns = self
            .columns
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                let mut ty: Option<ColumnType> = None;
                for row in &self.rows {
                    let Some(vt) = row.get(idx).and_then(Value::column_type) else {
                        continue;
                    };
                    ty = match (ty, vt) {
                        (None, t) => Some(t),
                        (Some(ColumnType::Integer), ColumnType::Float) => Some(ColumnType::Float),
                        (Some(t), _) => Some(t),
                    };
                    if ty != Some(ColumnType::Integer) {
                        break;
                    }
                }
                (name.clone(), ty.unwrap_or(ColumnType::Text))
            })
            .collect();
        Schema { columns }
    }
}

/// Query result returned to SQL callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// Keep only the projected columns (in projection order); `*` keeps all
    pub fn project(self, projection: &[String]) -> Result<Self> {
        if projection.is_empty() || projection.iter().any(|p| p == "*") {
            return Ok(self);
        }
        let indexes = projection
            .iter()
            .map(|p| {
                self.columns
                    .iter()
                    .position(|c| c == p)
                    .ok_or_else(|| Error::InvalidStatement(format!("unknown column '{}'", p)))
            })
            .collect::<Result<Vec<_>>>()?;
        let rows = self
            .rows
            .into_iter()
            .map(|row| indexes.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(Self {
            columns: projection.to_vec(),
            rows,
        })
    }
}

/// Predictor lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictorStatus {
    /// Record created, training not yet started
    Generating,
    /// Training job running
    Training,
    /// Model trained and queryable
    Complete,
    /// Training failed, message attached
    Error,
}

impl PredictorStatus {
    pub const ALL: [PredictorStatus; 4] = [
        PredictorStatus::Generating,
        PredictorStatus::Training,
        PredictorStatus::Complete,
        PredictorStatus::Error,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, PredictorStatus::Complete | PredictorStatus::Error)
    }

    /// Only the forward chain generating -> training -> complete|error is legal
    pub fn can_transition_to(&self, next: PredictorStatus) -> bool {
        matches!(
            (self, next),
            (PredictorStatus::Generating, PredictorStatus::Training)
                | (PredictorStatus::Training, PredictorStatus::Complete)
                | (PredictorStatus::Training, PredictorStatus::Error)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictorStatus::Generating => "generating",
            PredictorStatus::Training => "training",
            PredictorStatus::Complete => "complete",
            PredictorStatus::Error => "error",
        }
    }
}

impl fmt::Display for PredictorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a predictor's training rows come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    /// A data-fetch query issued through a named integration
    Query { integration: String, query: String },
    /// A stored external datasource
    Datasource { name: String },
}

impl SourceSpec {
    pub fn select_data_query(&self) -> Option<&str> {
        match self {
            SourceSpec::Query { query, .. } => Some(query),
            SourceSpec::Datasource { .. } => None,
        }
    }

    pub fn external_datasource(&self) -> Option<&str> {
        match self {
            SourceSpec::Datasource { name } => Some(name),
            SourceSpec::Query { .. } => None,
        }
    }

    pub fn integration(&self) -> Option<&str> {
        match self {
            SourceSpec::Query { integration, .. } => Some(integration),
            SourceSpec::Datasource { .. } => None,
        }
    }
}

/// Parsed `training_options` map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingOptions {
    /// Block the creating caller until training reaches a terminal status
    pub join_learn_process: bool,
    /// Hard training deadline in seconds
    pub stop_training_in_x_seconds: Option<u64>,
    /// Unrecognized keys, passed through to the learning engine
    #[serde(default)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TrainingOptions {
    pub const JOIN_LEARN_PROCESS: &'static str = "join_learn_process";
    pub const STOP_TRAINING_IN_X_SECONDS: &'static str = "stop_training_in_x_seconds";

    /// Parse the JSON object text stored in the `training_options` column
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::default());
        }
        let parsed: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            Error::InvalidStatement(format!("training_options is not valid JSON: {}", e))
        })?;
        let serde_json::Value::Object(map) = parsed else {
            return Err(Error::InvalidStatement(
                "training_options must be a JSON object".to_string(),
            ));
        };

        let mut options = Self::default();
        for (key, value) in map {
            match key.as_str() {
                Self::JOIN_LEARN_PROCESS => {
                    options.join_learn_process = json_bool(&value).ok_or_else(|| {
                        Error::InvalidStatement(format!("{} must be a boolean", key))
                    })?;
                }
                Self::STOP_TRAINING_IN_X_SECONDS => {
                    let secs = json_u64(&value).filter(|secs| *secs > 0).ok_or_else(|| {
                        Error::InvalidStatement(format!("{} must be a positive integer", key))
                    })?;
                    options.stop_training_in_x_seconds = Some(secs);
                }
                _ => {
                    options.extra.insert(key, value);
                }
            }
        }
        Ok(options)
    }

    /// Canonical JSON text form, as shown in the `predictors` table
    pub fn to_text(&self) -> String {
        let mut map = self.extra.clone();
        map.insert(
            Self::JOIN_LEARN_PROCESS.to_string(),
            serde_json::Value::Bool(self.join_learn_process),
        );
        if let Some(secs) = self.stop_training_in_x_seconds {
            map.insert(Self::STOP_TRAINING_IN_X_SECONDS.to_string(), secs.into());
        }
        serde_json::Value::Object(map).to_string()
    }
}

fn json_bool(value: &serde_json::Value) -> Option<bool> {
    match value {
        serde_json::Value::Bool(b) => Some(*b),
        serde_json::Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        serde_json::Value::String(s) => Value::Text(s.clone()).as_bool(),
        _ => None,
    }
}

fn json_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the comma-separated `predict` column list.
///
/// Every target adds a `<target>_confidence` result column, so targets may
/// neither repeat nor be named after another target's confidence column.
pub fn parse_predict_columns(text: &str) -> Result<Vec<String>> {
    let columns: Vec<String> = text.split(',').map(|c| c.trim().to_string()).collect();
    if columns.iter().any(|c| c.is_empty()) {
        return Err(Error::InvalidStatement(format!(
            "predict must be a comma-separated list of columns, got '{}'",
            text
        )));
    }
    for (i, column) in columns.iter().enumerate() {
        if columns[..i].contains(column) {
            return Err(Error::InvalidStatement(format!(
                "predict names '{}' more than once",
                column
            )));
        }
        if let Some(target) = column
            .strip_suffix(CONFIDENCE_SUFFIX)
            .filter(|t| columns.iter().any(|c| c == t))
        {
            return Err(Error::InvalidStatement(format!(
                "'{}' clashes with the confidence column of '{}'",
                column, target
            )));
        }
    }
    Ok(columns)
}

/// Registry record for one predictor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorRecord {
    pub name: String,
    pub predict: Vec<String>,
    pub source: SourceSpec,
    pub options: TrainingOptions,
    pub status: PredictorStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Schema of the training rows, known once training succeeded
    pub source_schema: Option<Schema>,
    /// Distinguishes successive predictors created under the same name
    #[serde(default)]
    pub generation: u64,
}

impl PredictorRecord {
    pub fn new(
        name: impl Into<String>,
        predict: Vec<String>,
        source: SourceSpec,
        options: TrainingOptions,
    ) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            predict,
            source,
            options,
            status: PredictorStatus::Generating,
            error: None,
            created_at: now,
            updated_at: now,
            source_schema: None,
            generation: 0,
        }
    }

    pub fn is_target(&self, column: &str) -> bool {
        self.predict.iter().any(|p| p == column)
    }

    /// True for `<target>_confidence` of one of the targets
    pub fn is_confidence_column(&self, column: &str) -> bool {
        column
            .strip_suffix(CONFIDENCE_SUFFIX)
            .is_some_and(|t| self.is_target(t))
    }

    /// Derived result table schema: targets, confidences, remaining source
    /// columns, then the two metadata columns
    pub fn result_schema(&self) -> Schema {
        let source = self.source_schema.clone().unwrap_or_default();
        let mut columns: Vec<(String, ColumnType)> = self
            .predict
            .iter()
            .map(|t| (t.clone(), source.column_type(t).unwrap_or(ColumnType::Text)))
            .collect();
        columns.extend(
            self.predict
                .iter()
                .map(|t| (format!("{}{}", t, CONFIDENCE_SUFFIX), ColumnType::Float)),
        );
        // A source column shadowed by a confidence column is not echoed
        columns.extend(
            source
                .columns
                .iter()
                .filter(|(n, _)| !self.is_target(n) && !self.is_confidence_column(n))
                .cloned(),
        );
        columns.push((SELECT_DATA_QUERY.to_string(), ColumnType::Text));
        columns.push((EXTERNAL_DATASOURCE.to_string(), ColumnType::Text));
        Schema { columns }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_forward_only() {
        use PredictorStatus::*;
        assert!(Generating.can_transition_to(Training));
        assert!(Training.can_transition_to(Complete));
        assert!(Training.can_transition_to(Error));
        assert!(!Generating.can_transition_to(Complete));
        assert!(!Complete.can_transition_to(Training));
        assert!(!Error.can_transition_to(Complete));
        assert!(!Training.can_transition_to(Generating));
    }

    #[test]
    fn test_training_options_parse() {
        let opts =
            TrainingOptions::parse(r#"{"join_learn_process": true, "stop_training_in_x_seconds": 3, "epochs": 5}"#)
                .unwrap();
        assert!(opts.join_learn_process);
        assert_eq!(opts.stop_training_in_x_seconds, Some(3));
        assert_eq!(opts.extra.get("epochs"), Some(&serde_json::json!(5)));

        let empty = TrainingOptions::parse("").unwrap();
        assert!(!empty.join_learn_process);
        assert!(empty.stop_training_in_x_seconds.is_none());
    }

    #[test]
    fn test_training_options_rejects_bad_types() {
        assert!(TrainingOptions::parse(r#"{"join_learn_process": "maybe"}"#).is_err());
        assert!(TrainingOptions::parse(r#"{"stop_training_in_x_seconds": -1}"#).is_err());
        // A zero deadline would race the engine for the first poll
        assert!(TrainingOptions::parse(r#"{"stop_training_in_x_seconds": 0}"#).is_err());
        assert!(TrainingOptions::parse(r#"{"stop_training_in_x_seconds": "0"}"#).is_err());
        assert!(TrainingOptions::parse("[1, 2]").is_err());
        assert!(TrainingOptions::parse("not json").is_err());
    }

    #[test]
    fn test_training_options_text_roundtrip_keeps_extra() {
        let opts = TrainingOptions::parse(r#"{"join_learn_process": "true", "k": 3}"#).unwrap();
        let reparsed = TrainingOptions::parse(&opts.to_text()).unwrap();
        assert_eq!(opts, reparsed);
    }

    #[test]
    fn test_parse_predict_columns() {
        assert_eq!(
            parse_predict_columns("enginesize, model").unwrap(),
            vec!["enginesize".to_string(), "model".to_string()]
        );
        assert!(parse_predict_columns("price,,year").is_err());
        assert!(parse_predict_columns("").is_err());
        assert_eq!(
            parse_predict_columns("price, price").unwrap_err().code(),
            "invalid_statement"
        );
        assert!(parse_predict_columns("price,price_confidence").is_err());
        assert!(parse_predict_columns("price_confidence").is_ok());
    }

    #[test]
    fn test_infer_schema_widens_integers() {
        let rows = RowSet::new(
            vec!["year".into(), "price".into(), "model".into(), "empty".into()],
            vec![
                vec![2017.into(), 100.into(), "A3".into(), Value::Null],
                vec![2018.into(), 150.5.into(), "A4".into(), Value::Null],
            ],
        );
        let schema = rows.infer_schema();
        assert_eq!(schema.column_type("year"), Some(ColumnType::Integer));
        assert_eq!(schema.column_type("price"), Some(ColumnType::Float));
        assert_eq!(schema.column_type("model"), Some(ColumnType::Text));
        assert_eq!(schema.column_type("empty"), Some(ColumnType::Text));
    }

    #[test]
    fn test_value_coercion() {
        assert_eq!(Value::Float(2.6).coerce(ColumnType::Integer), Value::Integer(3));
        assert_eq!(Value::Integer(2).coerce(ColumnType::Float), Value::Float(2.0));
        assert_eq!(Value::Integer(7).coerce(ColumnType::Text), Value::Text("7".into()));
        assert_eq!(Value::from("x").coerce(ColumnType::Float), Value::Null);
        assert!(Value::Integer(2017).loosely_equals(&Value::Text("2017".into())));
    }

    #[test]
    fn test_value_json_is_untagged() {
        let values: Vec<Value> = serde_json::from_str(r#"[null, true, 3, 2.5, "x"]"#).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Integer(3),
                Value::Float(2.5),
                Value::Text("x".into())
            ]
        );
    }

    #[test]
    fn test_result_schema_layout() {
        let mut record = PredictorRecord::new(
            "cars",
            vec!["price".into()],
            SourceSpec::Datasource { name: "ds".into() },
            TrainingOptions::default(),
        );
        record.source_schema = Some(Schema::new(vec![
            ("year".into(), ColumnType::Integer),
            ("price".into(), ColumnType::Float),
        ]));
        let schema = record.result_schema();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(
            names,
            vec![
                "price",
                "price_confidence",
                "year",
                SELECT_DATA_QUERY,
                EXTERNAL_DATASOURCE
            ]
        );
    }

    #[test]
    fn test_result_schema_skips_shadowed_source_column() {
        let mut record = PredictorRecord::new(
            "cars",
            vec!["price".into()],
            SourceSpec::Datasource { name: "ds".into() },
            TrainingOptions::default(),
        );
        record.source_schema = Some(Schema::new(vec![
            ("price_confidence".into(), ColumnType::Text),
            ("price".into(), ColumnType::Float),
        ]));
        let schema = record.result_schema();
        let names: Vec<&str> = schema.names().collect();
        assert_eq!(names.iter().filter(|n| **n == "price_confidence").count(), 1);
        assert_eq!(
            schema.column_type("price_confidence"),
            Some(ColumnType::Float)
        );
    }

    #[test]
    fn test_result_set_projection() {
        let mut rs = ResultSet::new(vec!["a".into(), "b".into()]);
        rs.rows.push(vec![1.into(), 2.into()]);
        let projected = rs.clone().project(&["b".to_string()]).unwrap();
        assert_eq!(projected.columns, vec!["b".to_string()]);
        assert_eq!(projected.rows, vec![vec![Value::Integer(2)]]);
        assert!(rs.clone().project(&["zzz".to_string()]).is_err());
        assert_eq!(rs.clone().project(&["*".to_string()]).unwrap(), rs);
    }
}
