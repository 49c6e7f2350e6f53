//! Query Router
//!
//! Classifies a free-text request into a query type and pulls out temporal
//! hints. Classification is keyword based: ordered rules first, then the
//! business glossary. Nothing here guesses; an unclassifiable request comes
//! back with no type.

mod rules;
mod time;

pub use rules::{default_rules, ClassifierRule, PatternRule};
pub use time::{extract_time_context, TimeContext};

use crate::error::SupportError;
use crate::registry::RegistrySnapshot;
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Result of classifying one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub query_type: Option<String>,
    pub context: TimeContext,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformCapabilities {
    pub platform: String,
    pub tables: BTreeSet<String>,
    pub query_types: Vec<String>,
}

pub struct QueryRouter {
    rules: Vec<Box<dyn ClassifierRule>>,
}

impl QueryRouter {
    pub fn new() -> Self {
        Self::with_rules(default_rules())
    }

    pub fn with_rules(rules: Vec<Box<dyn ClassifierRule>>) -> Self {
        Self { rules }
    }

    pub fn classify_query(&self, snapshot: &RegistrySnapshot, text: &str) -> Classification {
        let context = extract_time_context(text);

        if let Some(rule) = self.rules.iter().find(|rule| rule.matches(text)) {
            info!("Classified query as {} ({:?})", rule.query_type(), context);
            return Classification {
                query_type: Some(rule.query_type().to_string()),
                context,
            };
        }

        if let Some(query_type) = classify_from_glossary(snapshot, text) {
            info!("Classified query as {} via business glossary", query_type);
            return Classification {
                query_type: Some(query_type),
                context,
            };
        }

        info!("Could not classify query: {}", text);
        Classification {
            query_type: None,
            context,
        }
    }

    /// Split requested platforms into known and unknown. Never fails.
    pub fn validate_platforms(
        &self,
        snapshot: &RegistrySnapshot,
        requested: &[String],
    ) -> (BTreeSet<String>, BTreeSet<String>) {
        let available = snapshot.get_all_platforms();
        let (valid, invalid): (BTreeSet<String>, BTreeSet<String>) = requested
            .iter()
            .cloned()
            .partition(|platform| available.contains(platform));

        if !invalid.is_empty() {
            warn!("Invalid platforms requested: {:?}", invalid);
        }

        (valid, invalid)
    }

    /// Query types in rule order
    pub fn query_types(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.query_type()).collect()
    }

    pub fn supports_query_type(&self, query_type: &str) -> bool {
        self.rules.iter().any(|rule| rule.query_type() == query_type)
    }

    /// Tables declaring the query type plus every table of the given platforms
    pub fn get_required_tables(
        &self,
        snapshot: &RegistrySnapshot,
        query_type: &str,
        platforms: &BTreeSet<String>,
    ) -> BTreeSet<String> {
        let mut tables = snapshot.get_tables_for_query_type(query_type);
        for platform in platforms {
            tables.extend(snapshot.get_platform_tables(platform));
        }
        tables
    }

    pub fn validate_query_support(
        &self,
        snapshot: &RegistrySnapshot,
        query_type: &str,
        platforms: &[String],
    ) -> Result<(), SupportError> {
        if !self.supports_query_type(query_type) {
            return Err(SupportError::UnknownQueryType(query_type.to_string()));
        }

        let (valid, invalid) = self.validate_platforms(snapshot, platforms);
        if !invalid.is_empty() {
            return Err(SupportError::InvalidPlatforms(invalid.into_iter().collect()));
        }

        if self.get_required_tables(snapshot, query_type, &valid).is_empty() {
            return Err(SupportError::NoTables(query_type.to_string()));
        }

        Ok(())
    }

    /// Tables holding the platform's data and the query types those tables
    /// declare, in rule order
    pub fn platform_capabilities(&self, snapshot: &RegistrySnapshot, platform: &str) -> PlatformCapabilities {
        let tables = snapshot.get_platform_tables(platform);

        let query_types = self
            .rules
            .iter()
            .map(|rule| rule.query_type())
            .filter(|query_type| {
                snapshot
                    .get_tables_for_query_type(query_type)
                    .iter()
                    .any(|t| tables.contains(t))
            })
            .map(str::to_string)
            .collect();

        PlatformCapabilities {
            platform: platform.to_string(),
            tables,
            query_types,
        }
    }
}

impl Default for QueryRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// First token naming a glossary entry decides: the owning table's first
/// declared query type.
fn classify_from_glossary(snapshot: &RegistrySnapshot, text: &str) -> Option<String> {
    let lowered = text.to_lowercase();

    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|token| !token.is_empty())
        .find_map(|token| {
            let entry = snapshot.get_business_term(token)?;
            let schema = snapshot.get_table_schema(&entry.table)?;
            let query_type = schema.query_types.first()?;
            debug!("Glossary term '{}' maps to table {}", token, entry.table);
            Some(query_type.clone())
        })
}
