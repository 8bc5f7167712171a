//! Datasource storage with optional on-disk persistence

use super::{
    Datasource, DatasourceKind, DatasourceMeta, DatasourceOrigin, DatasourcePayload, RowHandle,
};
use crate::error::{Error, Result};
use crate::integration::IntegrationRegistry;
use crate::models::{RowSet, Schema};
use crate::persist::{read_json, write_json_atomic};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone)]
struct StoredDatasource {
    meta: DatasourceMeta,
    rows: Option<Arc<RowSet>>,
}

impl StoredDatasource {
    fn to_datasource(&self) -> Datasource {
        let handle = match (&self.meta.origin, &self.rows) {
            (DatasourceOrigin::Integration { integration, query }, _) => RowHandle::Integration {
                integration: integration.clone(),
                query: query.clone(),
            },
            (DatasourceOrigin::File { .. }, Some(rows)) => RowHandle::Rows(rows.clone()),
            (DatasourceOrigin::File { .. }, None) => RowHandle::Rows(Arc::new(RowSet::default())),
        };
        Datasource {
            meta: self.meta.clone(),
            handle,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedRows {
    schema: Schema,
    rows: RowSet,
}

/// Named datasource storage
pub struct DatasourceStore {
    entries: DashMap<String, StoredDatasource>,
    integrations: Arc<IntegrationRegistry>,
    /// `<data_dir>/datasources` when persistence is enabled
    root: Option<PathBuf>,
}

impl DatasourceStore {
    /// Create an in-memory store
    pub fn new(integrations: Arc<IntegrationRegistry>) -> Self {
        Self {
            entries: DashMap::new(),
            integrations,
            root: None,
        }
    }

    /// Create a store persisted under `root`, reloading any saved index
    pub fn open(root: impl Into<PathBuf>, integrations: Arc<IntegrationRegistry>) -> Result<Self> {
        let root = root.into();
        let store = Self {
            entries: DashMap::new(),
            integrations,
            root: Some(root.clone()),
        };

        let index_path = root.join(INDEX_FILE);
        if index_path.exists() {
            let metas: Vec<DatasourceMeta> = read_json(&index_path)?;
            for meta in metas {
                let rows = match &meta.origin {
                    DatasourceOrigin::File { content_hash } => {
                        match read_json::<PersistedRows>(&rows_path(&root, content_hash)) {
                            Ok(persisted) => Some(Arc::new(persisted.rows)),
                            Err(e) => {
                                warn!(datasource = %meta.name, error = %e, "Dropping datasource with unreadable rows");
                                continue;
                            }
                        }
                    }
                    DatasourceOrigin::Integration { .. } => None,
                };
                store
                    .entries
                    .insert(meta.name.clone(), StoredDatasource { meta, rows });
            }
            info!(path = %root.display(), datasources = store.entries.len(), "Loaded datasource index");
        }

        Ok(store)
    }

    /// Save a datasource; fails with `AlreadyExists` unless the name was deleted first
    pub async fn save(
        &self,
        name: &str,
        kind: DatasourceKind,
        payload: DatasourcePayload,
    ) -> Result<DatasourceMeta> {
        if self.entries.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }

        let stored = match (kind, payload) {
            (DatasourceKind::File, DatasourcePayload::Rows { rows }) => {
                let schema = rows.infer_schema();
                let content_hash = content_hash(&schema, &rows)?;
                let location = match &self.root {
                    Some(root) => {
                        let path = rows_path(root, &content_hash);
                        if !path.exists() {
                            write_json_atomic(
                                &path,
                                &PersistedRows {
                                    schema: schema.clone(),
                                    rows: rows.clone(),
                                },
                            )?;
                        }
                        path.display().to_string()
                    }
                    None => format!("memory:{}", content_hash),
                };
                StoredDatasource {
                    meta: DatasourceMeta {
                        name: name.to_string(),
                        kind,
                        schema,
                        row_count: rows.len(),
                        location,
                        origin: DatasourceOrigin::File { content_hash },
                        saved_at: Utc::now(),
                    },
                    rows: Some(Arc::new(rows)),
                }
            }
            (DatasourceKind::Integration, DatasourcePayload::Integration { integration, query }) => {
                let rows = self.integrations.fetch(&integration, &query).await?;
                StoredDatasource {
                    meta: DatasourceMeta {
                        name: name.to_string(),
                        kind,
                        schema: rows.infer_schema(),
                        row_count: rows.len(),
                        location: format!("{}:{}", integration, query),
                        origin: DatasourceOrigin::Integration { integration, query },
                        saved_at: Utc::now(),
                    },
                    rows: None,
                }
            }
            (kind, _) => {
                return Err(Error::InvalidStatement(format!(
                    "payload does not match datasource kind '{}'",
                    kind
                )))
            }
        };

        let meta = stored.meta.clone();
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(_) => return Err(Error::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(stored);
            }
        }

        if let Err(e) = self.persist_index() {
            self.entries.remove(name);
            return Err(e);
        }

        debug!(datasource = %name, kind = %meta.kind, rows = meta.row_count, "Datasource saved");
        Ok(meta)
    }

    /// Look up a datasource
    pub fn get(&self, name: &str) -> Result<Datasource> {
        self.entries
            .get(name)
            .map(|r| r.value().to_datasource())
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    /// Resolve the rows of a datasource, fetching integration-backed ones
    pub async fn rows(&self, name: &str) -> Result<RowSet> {
        match self.get(name)?.handle {
            RowHandle::Rows(rows) => Ok(rows.as_ref().clone()),
            RowHandle::Integration { integration, query } => {
                self.integrations.fetch(&integration, &query).await
            }
        }
    }

    /// Remove a datasource
    pub fn delete(&self, name: &str) -> Result<DatasourceMeta> {
        let (_, removed) = self
            .entries
            .remove(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;

        if let (Some(root), DatasourceOrigin::File { content_hash }) =
            (&self.root, &removed.meta.origin)
        {
            let shared = self.entries.iter().any(|e| {
                matches!(&e.meta.origin, DatasourceOrigin::File { content_hash: h } if h == content_hash)
            });
            if !shared {
                let path = rows_path(root, content_hash);
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove datasource rows");
                }
            }
        }

        self.persist_index()?;
        debug!(datasource = %name, "Datasource deleted");
        Ok(removed.meta)
    }

    /// Metadata for every stored datasource, sorted by name
    pub fn list(&self) -> Vec<DatasourceMeta> {
        let mut metas: Vec<DatasourceMeta> = self.entries.iter().map(|e| e.meta.clone()).collect();
        metas.sort_by(|a, b| a.name.cmp(&b.name));
        metas
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist_index(&self) -> Result<()> {
        if let Some(root) = &self.root {
            write_json_atomic(&root.join(INDEX_FILE), &self.list())?;
        }
        Ok(())
    }
}

fn rows_path(root: &Path, content_hash: &str) -> PathBuf {
    root.join(format!("{}.json", content_hash))
}

/// SHA-256 over the canonical JSON of schema and rows
fn content_hash(schema: &Schema, rows: &RowSet) -> Result<String> {
    let bytes = serde_json::to_vec(&(schema, rows))
        .map_err(|e| Error::Storage(format!("failed to encode rows: {}", e)))?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::MemoryIntegration;
    use crate::models::{ColumnType, Value};
    use tempfile::TempDir;

    fn sample_rows(n: i64) -> RowSet {
        RowSet::new(
            vec!["year".into(), "price".into()],
            (0..n)
                .map(|i| vec![Value::Integer(2000 + i), Value::Float(1.5 * i as f64)])
                .collect(),
        )
    }

    fn file_payload(n: i64) -> DatasourcePayload {
        DatasourcePayload::Rows {
            rows: sample_rows(n),
        }
    }

    #[tokio::test]
    async fn test_save_get_delete() {
        let store = DatasourceStore::new(Arc::new(IntegrationRegistry::new()));

        let meta = store
            .save("cars_ds", DatasourceKind::File, file_payload(5))
            .await
            .unwrap();
        assert_eq!(meta.row_count, 5);
        assert_eq!(meta.schema.column_type("price"), Some(ColumnType::Float));
        assert!(meta.location.starts_with("memory:"));

        let ds = store.get("cars_ds").unwrap();
        assert!(matches!(ds.handle, RowHandle::Rows(ref r) if r.len() == 5));

        store.delete("cars_ds").unwrap();
        assert_eq!(store.get("cars_ds").unwrap_err(), Error::NotFound("cars_ds".into()));
        assert_eq!(store.delete("cars_ds").unwrap_err(), Error::NotFound("cars_ds".into()));
    }

    #[tokio::test]
    async fn test_save_twice_requires_delete() {
        let store = DatasourceStore::new(Arc::new(IntegrationRegistry::new()));
        store.save("ds", DatasourceKind::File, file_payload(2)).await.unwrap();

        let err = store
            .save("ds", DatasourceKind::File, file_payload(3))
            .await
            .unwrap_err();
        assert_eq!(err, Error::AlreadyExists("ds".into()));

        store.delete("ds").unwrap();
        let meta = store.save("ds", DatasourceKind::File, file_payload(3)).await.unwrap();
        assert_eq!(meta.row_count, 3);
    }

    #[tokio::test]
    async fn test_identical_content_has_same_address() {
        let store = DatasourceStore::new(Arc::new(IntegrationRegistry::new()));
        let a = store.save("a", DatasourceKind::File, file_payload(4)).await.unwrap();
        let b = store.save("b", DatasourceKind::File, file_payload(4)).await.unwrap();
        let c = store.save("c", DatasourceKind::File, file_payload(5)).await.unwrap();
        assert_eq!(a.origin, b.origin);
        assert_ne!(a.origin, c.origin);
    }

    #[tokio::test]
    async fn test_kind_payload_mismatch_is_rejected() {
        let store = DatasourceStore::new(Arc::new(IntegrationRegistry::new()));
        let err = store
            .save("x", DatasourceKind::Integration, file_payload(1))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_statement");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_integration_backed_rows_resolve_on_read() {
        let integrations = Arc::new(IntegrationRegistry::new());
        let memory = Arc::new(MemoryIntegration::new("default"));
        memory.insert_table("cars", sample_rows(6));
        integrations.register(memory.clone());

        let store = DatasourceStore::new(integrations);
        let meta = store
            .save(
                "live",
                DatasourceKind::Integration,
                DatasourcePayload::Integration {
                    integration: "default".into(),
                    query: "select * from cars limit 2".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(meta.row_count, 2);
        assert_eq!(store.rows("live").await.unwrap().len(), 2);

        let missing = store
            .save(
                "dead",
                DatasourceKind::Integration,
                DatasourcePayload::Integration {
                    integration: "postgres".into(),
                    query: "select * from cars".into(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(missing, Error::IntegrationUnavailable("postgres".into()));
    }

    #[tokio::test]
    async fn test_persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let integrations = Arc::new(IntegrationRegistry::new());

        {
            let store = DatasourceStore::open(dir.path(), integrations.clone()).unwrap();
            let meta = store.save("ds", DatasourceKind::File, file_payload(3)).await.unwrap();
            assert!(Path::new(&meta.location).exists());
            store.save("gone", DatasourceKind::File, file_payload(7)).await.unwrap();
            store.delete("gone").unwrap();
        }

        let reopened = DatasourceStore::open(dir.path(), integrations).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.rows("ds").await.unwrap().len(), 3);
        assert!(reopened.get("gone").is_err());
    }

    #[tokio::test]
    async fn test_delete_keeps_shared_content() {
        let dir = TempDir::new().unwrap();
        let store =
            DatasourceStore::open(dir.path(), Arc::new(IntegrationRegistry::new())).unwrap();
        let a = store.save("a", DatasourceKind::File, file_payload(2)).await.unwrap();
        store.save("b", DatasourceKind::File, file_payload(2)).await.unwrap();

        store.delete("a").unwrap();
        assert!(Path::new(&a.location).exists());
        assert_eq!(store.rows("b").await.unwrap().len(), 2);
    }
}
