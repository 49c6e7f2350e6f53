//! Registry Snapshot
//!
//! One complete, internally consistent set of schemas, relationship graph,
//! glossary, templates, metrics and time patterns produced by a single load.
//! Snapshots are immutable once built.

use crate::error::{RegistryError, Result};
use crate::registry::document::{parse_document, TableSchema};
use crate::registry::graph::{RelationshipEdge, RelationshipGraph};
use crate::registry::source::{SkippedDocument, SourceContents, CONSOLIDATED};
use crate::registry::time_patterns::{builtin_time_patterns, TimePattern};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Name of the fallback template
pub const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TermKind {
    Column,
    Metric,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlossaryEntry {
    pub business_term: String,
    pub description: String,
    pub table: String,
    pub kind: TermKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub name: String,
    pub sql_template: String,
    pub description: String,
    pub table: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryTemplate {
    pub name: String,
    pub template: String,
    pub description: String,
    pub table: String,
    pub query_type: String,
    pub metrics: Vec<String>,
}

/// Summary of one load, returned to whoever triggered it.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub tables: Vec<String>,
    pub skipped: Vec<(String, String)>,
    pub relationships: usize,
    pub templates: usize,
    pub metrics: usize,
    pub fingerprint: String,
}

#[derive(Debug)]
pub struct RegistrySnapshot {
    schemas: IndexMap<String, TableSchema>,
    relationships: RelationshipGraph,
    glossary: HashMap<String, GlossaryEntry>,
    templates: IndexMap<String, QueryTemplate>,
    metrics: IndexMap<String, MetricDefinition>,
    time_patterns: Vec<TimePattern>,
    known_platforms: BTreeSet<String>,
    skipped: Vec<SkippedDocument>,
    fingerprint: String,
    loaded_at: DateTime<Utc>,
}

impl RegistrySnapshot {
    /// Parse every document and derive the graph and catalogs. Malformed
    /// documents are skipped and recorded, never fatal.
    pub fn build(contents: SourceContents) -> Self {
        let fingerprint = contents.fingerprint();

        let mut snapshot = Self {
            schemas: IndexMap::new(),
            relationships: RelationshipGraph::new(),
            glossary: HashMap::new(),
            templates: IndexMap::new(),
            metrics: IndexMap::new(),
            time_patterns: builtin_time_patterns(),
            known_platforms: BTreeSet::new(),
            skipped: contents.unreadable.clone(),
            fingerprint,
            loaded_at: Utc::now(),
        };

        snapshot.load(contents);
        snapshot.build_relationship_graph();
        snapshot.build_business_glossary();
        snapshot.load_query_templates();
        snapshot.load_metric_definitions();

        snapshot
    }

    fn load(&mut self, contents: SourceContents) {
        for doc in contents.documents {
            let mut schema = match parse_document(&doc.content, doc.format) {
                Ok(schema) => schema,
                Err(cause) => {
                    let err = RegistryError::SchemaLoad {
                        origin: doc.origin.clone(),
                        cause: cause.clone(),
                    };
                    warn!("{}", err);
                    self.skipped.push(SkippedDocument {
                        origin: doc.origin,
                        reason: cause,
                    });
                    continue;
                }
            };

            if !schema.platform.is_empty() && schema.platform != doc.namespace {
                debug!(
                    "Document {} declares platform '{}' but lives in '{}'; using the namespace",
                    doc.origin, schema.platform, doc.namespace
                );
            }
            schema.platform = doc.namespace.clone();

            if schema.platform != CONSOLIDATED {
                self.known_platforms.insert(schema.platform.clone());
            }
            self.known_platforms.extend(schema.platforms.iter().cloned());

            let table = schema.table_name.clone();
            // A redefinition takes the position of the last-loaded document
            if self.schemas.shift_remove(&table).is_some() {
                warn!(
                    "Duplicate table_name '{}' in {}; replacing the earlier definition",
                    table, doc.origin
                );
            }
            self.schemas.insert(table.clone(), schema);

            debug!("Loaded schema {} (platform={})", table, doc.namespace);
        }
    }

    fn build_relationship_graph(&mut self) {
        let mut graph = RelationshipGraph::new();

        for table in self.schemas.keys() {
            graph.add_node(table);
        }

        for (table, schema) in &self.schemas {
            for rel in &schema.relationships {
                let (Some(target), Some(rel_type)) = (&rel.table, &rel.relationship_type) else {
                    continue;
                };

                if !self.schemas.contains_key(target) {
                    warn!(
                        "Relationship {} -> {} targets a table missing from this snapshot",
                        table, target
                    );
                }

                graph.add_edge(
                    table,
                    target,
                    RelationshipEdge {
                        relationship_type: rel_type.clone(),
                        keys: rel.keys.clone(),
                        description: rel.description.clone(),
                    },
                );
            }
        }

        self.relationships = graph;
    }

    fn build_business_glossary(&mut self) {
        let mut glossary = HashMap::new();

        for schema in self.schemas.values() {
            for column in &schema.columns {
                if let Some(term) = &column.business_term {
                    glossary.insert(
                        column.name.to_lowercase(),
                        GlossaryEntry {
                            business_term: term.clone(),
                            description: column.description.clone(),
                            table: schema.table_name.clone(),
                            kind: TermKind::Column,
                        },
                    );
                }
            }

            for metric in &schema.common_metrics {
                if let Some(name) = &metric.name {
                    let term = if metric.description.is_empty() {
                        name.clone()
                    } else {
                        metric.description.clone()
                    };
                    glossary.insert(
                        name.to_lowercase(),
                        GlossaryEntry {
                            business_term: term,
                            description: metric.description.clone(),
                            table: schema.table_name.clone(),
                            kind: TermKind::Metric,
                        },
                    );
                }
            }
        }

        self.glossary = glossary;
    }

    fn load_query_templates(&mut self) {
        let mut templates = IndexMap::new();

        for schema in self.schemas.values() {
            for spec in &schema.query_templates {
                let (Some(name), Some(template)) = (&spec.name, &spec.template) else {
                    continue;
                };
                templates.insert(
                    name.clone(),
                    QueryTemplate {
                        name: name.clone(),
                        template: template.clone(),
                        description: spec.description.clone(),
                        table: schema.table_name.clone(),
                        query_type: spec.query_type.clone().unwrap_or_else(|| "general".to_string()),
                        metrics: spec.metrics.clone(),
                    },
                );
            }
        }

        self.templates = templates;
    }

    fn load_metric_definitions(&mut self) {
        let mut metrics = IndexMap::new();

        for schema in self.schemas.values() {
            for spec in &schema.common_metrics {
                let (Some(name), Some(sql)) = (&spec.name, &spec.sql_template) else {
                    continue;
                };
                metrics.insert(
                    name.clone(),
                    MetricDefinition {
                        name: name.clone(),
                        sql_template: sql.clone(),
                        description: spec.description.clone(),
                        table: schema.table_name.clone(),
                    },
                );
            }
        }

        self.metrics = metrics;
    }

    /// Minimum structure a snapshot needs before it may replace another.
    pub fn check_minimum_structure(&self) -> Result<()> {
        if self.schemas.is_empty() {
            return Err(RegistryError::SnapshotRejected {
                cause: format!(
                    "no valid schema documents ({} skipped)",
                    self.skipped.len()
                ),
            });
        }
        Ok(())
    }

    pub fn report(&self) -> LoadReport {
        LoadReport {
            tables: self.schemas.keys().cloned().collect(),
            skipped: self
                .skipped
                .iter()
                .map(|s| (s.origin.clone(), s.reason.clone()))
                .collect(),
            relationships: self.relationships.edge_count(),
            templates: self.templates.len(),
            metrics: self.metrics.len(),
            fingerprint: self.fingerprint.clone(),
        }
    }

    pub fn log_summary(&self) {
        info!(
            "Schema registry snapshot {}: schemas={}, relationships={}, templates={}, metrics={}, skipped={}",
            &self.fingerprint[..12.min(self.fingerprint.len())],
            self.schemas.len(),
            self.relationships.edge_count(),
            self.templates.len(),
            self.metrics.len(),
            self.skipped.len()
        );
    }

    // Public access methods

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Tables in registry iteration (load) order
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.schemas.values()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn get_table_schema(&self, table: &str) -> Option<&TableSchema> {
        self.schemas.get(table)
    }

    pub fn table_exists(&self, table: &str) -> bool {
        self.schemas.contains_key(table)
    }

    /// Position of a table in registry iteration order
    pub fn table_index(&self, table: &str) -> Option<usize> {
        self.schemas.get_index_of(table)
    }

    pub fn relationships(&self) -> &RelationshipGraph {
        &self.relationships
    }

    pub fn has_relationship(&self, from: &str, to: &str) -> bool {
        self.relationships.has_edge(from, to)
    }

    pub fn relationship(&self, from: &str, to: &str) -> Option<&RelationshipEdge> {
        self.relationships.edge(from, to)
    }

    pub fn get_relationship_path(&self, source: &str, target: &str) -> Option<Vec<String>> {
        self.relationships.shortest_path(source, target)
    }

    pub fn get_business_term(&self, technical_term: &str) -> Option<&GlossaryEntry> {
        self.glossary.get(&technical_term.to_lowercase())
    }

    pub fn glossary_len(&self) -> usize {
        self.glossary.len()
    }

    pub fn get_query_template(&self, name: &str) -> Option<&QueryTemplate> {
        self.templates.get(name)
    }

    pub fn query_templates(&self) -> impl Iterator<Item = &QueryTemplate> {
        self.templates.values()
    }

    pub fn get_metric_definition(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.get(name)
    }

    pub fn metric_definitions(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    pub fn get_time_pattern(&self, name: &str) -> Option<&TimePattern> {
        self.time_patterns.iter().find(|p| p.name == name)
    }

    pub fn time_patterns(&self) -> &[TimePattern] {
        &self.time_patterns
    }

    pub fn get_tables_for_query_type(&self, query_type: &str) -> BTreeSet<String> {
        self.schemas
            .iter()
            .filter(|(_, schema)| schema.query_types.iter().any(|t| t == query_type))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn get_column_type(&self, table: &str, column: &str) -> Option<&str> {
        self.get_table_schema(table)
            .and_then(|schema| schema.column(column))
            .map(|c| c.data_type.as_str())
    }

    pub fn get_platform_tables(&self, platform: &str) -> BTreeSet<String> {
        self.schemas
            .iter()
            .filter(|(_, schema)| schema.platform == platform || schema.platforms.iter().any(|p| p == platform))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn get_all_platforms(&self) -> &BTreeSet<String> {
        &self.known_platforms
    }

    pub fn skipped(&self) -> &[SkippedDocument] {
        &self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::source::RawDocument;
    use crate::test_support::{fixture_contents, table_doc};

    #[test]
    fn test_build_from_fixtures() {
        let snapshot = RegistrySnapshot::build(fixture_contents());
        assert!(snapshot.check_minimum_structure().is_ok());
        assert!(snapshot.table_exists("orders"));
        assert!(snapshot.table_exists("customers"));
        assert!(snapshot.has_relationship("orders", "customers"));
        assert_eq!(snapshot.get_column_type("orders", "total_amount"), Some("NUMERIC"));
        assert!(snapshot.get_all_platforms().contains("shopify"));
        assert!(!snapshot.get_all_platforms().contains(CONSOLIDATED));
    }

    #[test]
    fn test_tables_for_query_type() {
        let snapshot = RegistrySnapshot::build(fixture_contents());
        let tables = snapshot.get_tables_for_query_type("sales");
        assert!(tables.contains("orders"));
        assert!(!tables.contains("products"));
        assert!(snapshot.get_tables_for_query_type("unknown").is_empty());
    }

    #[test]
    fn test_nine_valid_one_malformed() {
        let mut documents: Vec<RawDocument> = (0..9)
            .map(|i| table_doc("consolidated", &format!("table_{}", i)))
            .collect();
        documents.insert(
            4,
            RawDocument::yaml("consolidated", "consolidated/broken.yaml", "columns:\n  - name: x\n"),
        );

        let snapshot = RegistrySnapshot::build(SourceContents {
            documents,
            unreadable: Vec::new(),
        });

        assert_eq!(snapshot.table_names().count(), 9);
        assert_eq!(snapshot.skipped().len(), 1);
        assert_eq!(snapshot.skipped()[0].origin, "consolidated/broken.yaml");
    }

    #[test]
    fn test_duplicate_table_overwrites() {
        let first = RawDocument::yaml(
            "shopify",
            "shopify/orders.yaml",
            "table_name: orders\ncolumns:\n  - {name: a, type: STRING}\n",
        );
        let second = RawDocument::yaml(
            "amazon",
            "amazon/orders.yaml",
            "table_name: orders\ncolumns:\n  - {name: b, type: STRING}\n",
        );
        let snapshot = RegistrySnapshot::build(SourceContents {
            documents: vec![first, second],
            unreadable: Vec::new(),
        });

        assert_eq!(snapshot.table_names().count(), 1);
        let orders = snapshot.get_table_schema("orders").unwrap();
        assert!(orders.has_column("b"));
        assert_eq!(orders.platform, "amazon");
    }

    #[test]
    fn test_duplicate_table_takes_last_loaded_position() {
        let snapshot = RegistrySnapshot::build(SourceContents {
            documents: vec![
                table_doc("shopify", "orders"),
                table_doc("consolidated", "customers"),
                table_doc("amazon", "orders"),
            ],
            unreadable: Vec::new(),
        });

        assert_eq!(snapshot.table_names().collect::<Vec<_>>(), vec!["customers", "orders"]);
        assert_eq!(snapshot.table_index("orders"), Some(1));
        assert_eq!(snapshot.get_table_schema("orders").unwrap().platform, "amazon");
    }

    #[test]
    fn test_glossary_last_loaded_wins() {
        let a = RawDocument::yaml(
            "shopify",
            "shopify/a.yaml",
            "table_name: a\ncolumns:\n  - {name: revenue, type: NUMERIC, business_term: Revenue A}\n",
        );
        let b = RawDocument::yaml(
            "shopify",
            "shopify/b.yaml",
            "table_name: b\ncolumns:\n  - {name: revenue, type: NUMERIC, business_term: Revenue B}\n",
        );
        let snapshot = RegistrySnapshot::build(SourceContents {
            documents: vec![a, b],
            unreadable: Vec::new(),
        });

        let entry = snapshot.get_business_term("revenue").unwrap();
        assert_eq!(entry.business_term, "Revenue B");
        assert_eq!(entry.table, "b");
        assert_eq!(entry.kind, TermKind::Column);
    }

    #[test]
    fn test_dangling_relationship_kept() {
        let doc = RawDocument::yaml(
            "shopify",
            "shopify/orders.yaml",
            r#"
table_name: orders
columns:
  - {name: warehouse_id, type: STRING}
relationships:
  - table: warehouses
    type: many_to_one
    keys: {warehouse_id: id}
"#,
        );
        let snapshot = RegistrySnapshot::build(SourceContents {
            documents: vec![doc],
            unreadable: Vec::new(),
        });

        assert!(snapshot.has_relationship("orders", "warehouses"));
        assert!(!snapshot.table_exists("warehouses"));
    }

    #[test]
    fn test_empty_snapshot_fails_minimum_structure() {
        let snapshot = RegistrySnapshot::build(SourceContents::default());
        assert!(matches!(
            snapshot.check_minimum_structure(),
            Err(RegistryError::SnapshotRejected { .. })
        ));
    }
}
