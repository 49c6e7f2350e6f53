//! Execution Backend
//!
//! The managed query engine is a collaborator: it confirms tables exist,
//! reports their live columns and estimates query cost with a dry run.
//! Nothing in this crate executes the generated SQL.

mod bigquery;
mod offline;
mod retry;

pub use bigquery::{BigQueryBackend, BigQuerySettings};
pub use offline::OfflineBackend;
pub use retry::{call_with_retry, RetryPolicy};

use crate::error::BackendError;
use crate::sql::ParamMap;
use async_trait::async_trait;
use serde::Serialize;

/// A column as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BackendColumn {
    pub name: String,
    pub data_type: String,
    pub mode: Option<String>,
    pub description: Option<String>,
}

/// `project.dataset.table`, `dataset.table` or a bare table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: Option<String>,
    pub dataset: Option<String>,
    pub table: String,
}

impl TableRef {
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.trim().trim_matches('`');
        let parts: Vec<&str> = cleaned.split('.').collect();
        match parts.as_slice() {
            [project, dataset, table] => TableRef {
                project: Some(project.to_string()),
                dataset: Some(dataset.to_string()),
                table: table.to_string(),
            },
            [dataset, table] => TableRef {
                project: None,
                dataset: Some(dataset.to_string()),
                table: table.to_string(),
            },
            _ => TableRef {
                project: None,
                dataset: None,
                table: cleaned.to_string(),
            },
        }
    }
}

impl std::fmt::Display for TableRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.project, &self.dataset) {
            (Some(p), Some(d)) => write!(f, "{}.{}.{}", p, d, self.table),
            (None, Some(d)) => write!(f, "{}.{}", d, self.table),
            _ => write!(f, "{}", self.table),
        }
    }
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    async fn table_exists(&self, table: &TableRef) -> Result<bool, BackendError>;

    async fn get_table_schema(&self, table: &TableRef) -> Result<Vec<BackendColumn>, BackendError>;

    /// Estimated bytes scanned, without running the query
    async fn dry_run(&self, sql: &str, params: &ParamMap) -> Result<u64, BackendError>;
}
