//! Named data integrations
//!
//! An integration is an external data connection that answers data-fetch
//! queries with row sets. Training pulls rows through it and bulk prediction
//! queries (`select_data_query = '...'`) are answered by it.

mod memory;

pub use memory::{MemoryIntegration, TableQuery};

use crate::error::{Error, Result};
use crate::models::RowSet;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Trait for named-integration data sources
#[async_trait]
pub trait Integration: Send + Sync {
    /// Integration name used in predictor source specs
    fn name(&self) -> &str;

    /// Execute a data-fetch query, returning rows in query order
    async fn fetch(&self, query: &str) -> Result<RowSet>;
}

/// Registry of the integrations available to the engine
#[derive(Default)]
pub struct IntegrationRegistry {
    integrations: DashMap<String, Arc<dyn Integration>>,
}

impl IntegrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) an integration under its own name
    pub fn register(&self, integration: Arc<dyn Integration>) {
        let name = integration.name().to_string();
        info!(integration = %name, "Registering integration");
        self.integrations.insert(name, integration);
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Integration>> {
        self.integrations.remove(name).map(|(_, v)| v)
    }

    /// Look up an integration, failing with `IntegrationUnavailable`
    pub fn get(&self, name: &str) -> Result<Arc<dyn Integration>> {
        self.integrations
            .get(name)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::IntegrationUnavailable(name.to_string()))
    }

    /// Fetch rows through the named integration
    pub async fn fetch(&self, name: &str, query: &str) -> Result<RowSet> {
        let integration = self.get(name)?;
        debug!(integration = %name, query = %query, "Fetching rows");
        integration.fetch(query).await
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.integrations.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    #[tokio::test]
    async fn test_registry_fetch_and_missing_integration() {
        let registry = IntegrationRegistry::new();
        let memory = MemoryIntegration::new("default");
        memory.insert_table(
            "test_data.t",
            RowSet::new(vec!["a".into()], vec![vec![Value::Integer(1)]]),
        );
        registry.register(Arc::new(memory));

        let rows = registry.fetch("default", "select * from test_data.t").await.unwrap();
        assert_eq!(rows.len(), 1);

        let err = registry.fetch("postgres", "select 1").await.unwrap_err();
        assert_eq!(err, Error::IntegrationUnavailable("postgres".into()));
        assert_eq!(registry.names(), vec!["default".to_string()]);
    }
}
