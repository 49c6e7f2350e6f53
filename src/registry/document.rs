//! Schema Documents
//!
//! One document describes one table: its columns, outgoing relationships,
//! metrics, query templates and the query types it serves.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Column types usable as the date field of a time filter.
const TEMPORAL_TYPES: &[&str] = &["DATE", "DATETIME", "TIMESTAMP"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableSchema {
    pub table_name: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
    #[serde(default)]
    pub common_metrics: Vec<MetricSpec>,
    #[serde(default)]
    pub query_templates: Vec<TemplateSpec>,
    #[serde(default)]
    pub query_types: Vec<String>,
    /// Explicit date field for time filters
    #[serde(default)]
    pub date_column: Option<String>,
    /// Platforms whose data a consolidated table covers
    #[serde(default)]
    pub platforms: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub business_term: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Aggregate functions allowed over this column, e.g. `[SUM, AVG]`
    #[serde(default)]
    pub aggregation_rules: Vec<String>,
}

/// Relationship entries lacking `table` or `type` are ignored when the graph is built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipSpec {
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default, rename = "type")]
    pub relationship_type: Option<String>,
    /// local column -> foreign column
    #[serde(default)]
    pub keys: IndexMap<String, String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sql_template: Option<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpec {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default, rename = "type")]
    pub query_type: Option<String>,
    #[serde(default)]
    pub metrics: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// The declared `date_column` when it names a real column, otherwise the
    /// first column with a temporal type.
    pub fn date_column(&self) -> Option<&ColumnSchema> {
        if let Some(declared) = self.date_column.as_deref() {
            if let Some(col) = self.column(declared) {
                return Some(col);
            }
        }

        self.columns.iter().find(|c| {
            let ty = c.data_type.to_ascii_uppercase();
            TEMPORAL_TYPES.contains(&ty.as_str())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => Some(DocumentFormat::Yaml),
            Some("json") => Some(DocumentFormat::Json),
            _ => None,
        }
    }
}

/// Parse a document and check the structure the registry depends on.
pub fn parse_document(content: &str, format: DocumentFormat) -> Result<TableSchema, String> {
    let schema: TableSchema = match format {
        DocumentFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string())?,
        DocumentFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string())?,
    };

    validate_structure(&schema)?;
    Ok(schema)
}

fn validate_structure(schema: &TableSchema) -> Result<(), String> {
    if schema.table_name.trim().is_empty() {
        return Err("table_name is empty".to_string());
    }

    for (idx, column) in schema.columns.iter().enumerate() {
        if column.name.trim().is_empty() {
            return Err(format!("column {} has an empty name", idx));
        }
        if column.data_type.trim().is_empty() {
            return Err(format!("column '{}' has an empty type", column.name));
        }
    }

    Ok(())
}
