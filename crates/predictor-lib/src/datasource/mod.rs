//! Datasource store
//!
//! Named, immutable row sets supplied from outside the engine. File-backed
//! datasources are content-addressed by the SHA-256 of their schema and rows;
//! integration-backed datasources keep a retrieval handle that is resolved on
//! every read.

mod store;

pub use store::DatasourceStore;

use crate::models::{RowSet, Schema};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Origin kind of a datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasourceKind {
    File,
    Integration,
}

impl fmt::Display for DatasourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasourceKind::File => f.write_str("file"),
            DatasourceKind::Integration => f.write_str("integration"),
        }
    }
}

/// Payload supplied when saving a datasource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasourcePayload {
    /// Already-ingested rows
    Rows { rows: RowSet },
    /// Rows fetched through an integration when read
    Integration { integration: String, query: String },
}

/// How the rows of a datasource are located
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasourceOrigin {
    File { content_hash: String },
    Integration { integration: String, query: String },
}

/// Metadata describing a stored datasource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceMeta {
    pub name: String,
    pub kind: DatasourceKind,
    pub schema: Schema,
    /// Row count at save time
    pub row_count: usize,
    /// Storage location (file path, `memory:<hash>`, or `<integration>:<query>`)
    pub location: String,
    pub origin: DatasourceOrigin,
    pub saved_at: DateTime<Utc>,
}

/// Row-set handle returned by `get`
#[derive(Debug, Clone)]
pub enum RowHandle {
    Rows(Arc<RowSet>),
    Integration { integration: String, query: String },
}

/// A datasource as returned by the store
#[derive(Debug, Clone)]
pub struct Datasource {
    pub meta: DatasourceMeta,
    pub handle: RowHandle,
}
