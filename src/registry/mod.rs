//! Schema Registry
//!
//! Loads table metadata and derives everything the pipeline reads from it:
//! the relationship graph, business glossary, metric and template catalogs and
//! named time windows.
//!
//! Directory structure:
//! ```text
//! {schema_dir}/
//!   ├── shopify/
//!   │   └── *.yaml | *.yml | *.json
//!   ├── amazon/
//!   ├── ebay/
//!   └── consolidated/
//! ```

mod document;
mod graph;
mod snapshot;
mod source;
mod store;
mod time_patterns;

pub use document::{
    parse_document, ColumnSchema, DocumentFormat, MetricSpec, RelationshipSpec, TableSchema,
    TemplateSpec,
};
pub use graph::{RelationshipEdge, RelationshipGraph};
pub use snapshot::{
    GlossaryEntry, LoadReport, MetricDefinition, QueryTemplate, RegistrySnapshot, TermKind,
    DEFAULT_TEMPLATE,
};
pub use source::{DocumentSource, RawDocument, SkippedDocument, SourceContents, CONSOLIDATED};
pub use store::SchemaRegistry;
pub use time_patterns::{builtin_time_patterns, contains_phrase, DateRange, TimePattern};
