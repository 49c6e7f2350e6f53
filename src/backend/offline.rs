//! Registry-backed stand-in for environments without backend credentials.
//! Tables exist when the registry knows them; every dry run costs zero bytes.

use crate::backend::{BackendColumn, ExecutionBackend, TableRef};
use crate::error::BackendError;
use crate::registry::SchemaRegistry;
use crate::sql::ParamMap;
use async_trait::async_trait;
use std::sync::Arc;

pub struct OfflineBackend {
    registry: Arc<SchemaRegistry>,
}

impl OfflineBackend {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }
}

fn unavailable(operation: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::Failed {
        operation: operation.to_string(),
        cause: e.to_string(),
    }
}

#[async_trait]
impl ExecutionBackend for OfflineBackend {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, BackendError> {
        let snapshot = self
            .registry
            .snapshot()
            .await
            .map_err(|e| unavailable("table_exists", e))?;
        Ok(snapshot.table_exists(&table.table))
    }

    async fn get_table_schema(&self, table: &TableRef) -> Result<Vec<BackendColumn>, BackendError> {
        let snapshot = self
            .registry
            .snapshot()
            .await
            .map_err(|e| unavailable("get_table_schema", e))?;

        let schema = snapshot
            .get_table_schema(&table.table)
            .ok_or_else(|| unavailable("get_table_schema", format!("table {} not found", table)))?;

        Ok(schema
            .columns
            .iter()
            .map(|c| BackendColumn {
                name: c.name.clone(),
                data_type: c.data_type.clone(),
                mode: None,
                description: Some(c.description.clone()).filter(|d| !d.is_empty()),
            })
            .collect())
    }

    async fn dry_run(&self, _sql: &str, _params: &ParamMap) -> Result<u64, BackendError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::DocumentSource;
    use crate::test_support::fixture_documents;
    use std::time::Duration;

    #[tokio::test]
    async fn test_offline_backend_reads_registry() {
        let registry = Arc::new(SchemaRegistry::new(
            DocumentSource::Inline(fixture_documents()),
            vec!["shopify".to_string()],
            Duration::from_secs(60),
        ));
        let backend = OfflineBackend::new(registry.clone());

        assert!(backend
            .table_exists(&TableRef::parse("orders"))
            .await
            .is_err());

        registry.initialize().await.unwrap();
        assert!(backend
            .table_exists(&TableRef::parse("p.d.orders"))
            .await
            .unwrap());
        assert!(!backend
            .table_exists(&TableRef::parse("refunds"))
            .await
            .unwrap());

        let columns = backend
            .get_table_schema(&TableRef::parse("orders"))
            .await
            .unwrap();
        assert!(columns.iter().any(|c| c.name == "total_amount"));
    }
}
