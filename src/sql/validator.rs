//! SQL Validator
//!
//! Ordered, short-circuiting checks over one generated statement:
//! security scan, table extraction, table existence, column resolution,
//! join keys, aggregation, platform predicate, placeholders and a cost
//! estimate from a backend dry run. Only the first failure is reported.

use crate::backend::{call_with_retry, ExecutionBackend, RetryPolicy, TableRef};
use crate::error::ValidationError;
use crate::registry::RegistrySnapshot;
use crate::security;
use crate::sql::inspect::{canonical_expression, column_refs, ColumnRef, SqlOutline, TableMention};
use crate::sql::params::ParamMap;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const PLATFORM_COLUMN: &str = "platform";

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Dry-run estimate above which a query is rejected
    pub max_bytes_processed: u64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            max_bytes_processed: 10 * 1024 * 1024 * 1024,
        }
    }
}

pub struct SqlValidator {
    backend: Arc<dyn ExecutionBackend>,
    settings: ValidatorSettings,
    retry: RetryPolicy,
    /// (snapshot fingerprint, table reference) confirmed by the backend
    confirmed_tables: DashMap<(String, String), ()>,
}

impl SqlValidator {
    pub fn new(backend: Arc<dyn ExecutionBackend>, settings: ValidatorSettings, retry: RetryPolicy) -> Self {
        Self {
            backend,
            settings,
            retry,
            confirmed_tables: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ValidatorSettings {
        &self.settings
    }

    pub async fn validate(
        &self,
        snapshot: &RegistrySnapshot,
        sql: &str,
        params: &ParamMap,
    ) -> Result<(), ValidationError> {
        if let Some(rule) = security::scan(sql) {
            return Err(ValidationError::SecurityViolation { rule });
        }

        let outline = SqlOutline::parse(sql);

        if outline.tables.is_empty() {
            return Err(ValidationError::failed(
                "No tables referenced in FROM or JOIN clauses",
            ));
        }
        debug!(
            "Validating query over tables {:?}",
            outline.tables.iter().map(|t| &t.table).collect::<Vec<_>>()
        );

        let result = async {
            self.check_tables_exist(snapshot, &outline).await?;
            check_columns(snapshot, &outline)?;
            check_joins(snapshot, &outline)?;
            check_aggregation(&outline)?;
            check_platform_predicates(snapshot, &outline)?;
            check_placeholders(&outline, params)?;
            self.check_cost(sql, params).await
        }
        .await;

        match &result {
            Ok(bytes) => info!(
                "SQL validated: {} table(s), {} bytes estimated",
                outline.tables.len(),
                bytes
            ),
            Err(e) => warn!("SQL validation failed: {}", e),
        }

        result.map(|_| ())
    }

    async fn check_tables_exist(
        &self,
        snapshot: &RegistrySnapshot,
        outline: &SqlOutline,
    ) -> Result<(), ValidationError> {
        let fingerprint = snapshot.fingerprint();
        self.confirmed_tables.retain(|(fp, _), _| fp == fingerprint);

        for mention in &outline.tables {
            if !snapshot.table_exists(&mention.table) {
                return Err(ValidationError::failed(format!(
                    "Table {} is not defined in the schema registry",
                    mention.table
                )));
            }

            let key = (fingerprint.to_string(), mention.reference.clone());
            if self.confirmed_tables.contains_key(&key) {
                debug!("Table {} existence cached", mention.reference);
                continue;
            }

            let table_ref = TableRef::parse(&mention.reference);
            let exists = call_with_retry("table_exists", &self.retry, || {
                self.backend.table_exists(&table_ref)
            })
            .await?;

            if !exists {
                return Err(ValidationError::failed(format!(
                    "Table {} does not exist in the query backend",
                    mention.reference
                )));
            }
            self.confirmed_tables.insert(key, ());
        }

        Ok(())
    }

    async fn check_cost(&self, sql: &str, params: &ParamMap) -> Result<u64, ValidationError> {
        let bytes = call_with_retry("dry_run", &self.retry, || self.backend.dry_run(sql, params)).await?;

        if bytes > self.settings.max_bytes_processed {
            return Err(ValidationError::failed(format!(
                "Query would process {} bytes, above the limit of {} bytes",
                bytes, self.settings.max_bytes_processed
            )));
        }

        Ok(bytes)
    }
}

fn table_has_column(snapshot: &RegistrySnapshot, table: &str, column: &str) -> bool {
    snapshot
        .get_table_schema(table)
        .is_some_and(|schema| schema.has_column(column))
}

fn check_columns(snapshot: &RegistrySnapshot, outline: &SqlOutline) -> Result<(), ValidationError> {
    let aliases = outline.select_aliases();

    let mut clauses: Vec<(&str, &str)> = outline
        .select
        .iter()
        .map(|item| ("SELECT", item.expression.as_str()))
        .collect();
    if let Some(where_clause) = &outline.where_clause {
        clauses.push(("WHERE", where_clause.as_str()));
    }
    clauses.extend(outline.group_by.iter().map(|g| ("GROUP BY", g.as_str())));
    if let Some(having) = &outline.having {
        clauses.push(("HAVING", having.as_str()));
    }

    for (clause, expression) in clauses {
        for column in column_refs(expression) {
            resolve_column(snapshot, outline, &column, clause, &aliases)?;
        }
    }

    Ok(())
}

fn resolve_column(
    snapshot: &RegistrySnapshot,
    outline: &SqlOutline,
    column: &ColumnRef,
    clause: &str,
    aliases: &[&str],
) -> Result<(), ValidationError> {
    match &column.qualifier {
        Some(qualifier) => {
            let Some(mention) = outline.resolve_qualifier(qualifier) else {
                return Err(ValidationError::failed(format!(
                    "Column {} in {} uses unknown table qualifier {}",
                    column, clause, qualifier
                )));
            };
            if !table_has_column(snapshot, &mention.table, &column.column) {
                return Err(ValidationError::failed(format!(
                    "Column {} not found in table {}",
                    column.column, mention.table
                )));
            }
        }
        None => {
            let in_tables = outline
                .tables
                .iter()
                .any(|t| table_has_column(snapshot, &t.table, &column.column));
            let is_alias = matches!(clause, "HAVING" | "GROUP BY")
                && aliases.iter().any(|a| a.eq_ignore_ascii_case(&column.column));

            if !in_tables && !is_alias {
                return Err(ValidationError::failed(format!(
                    "Column {} in {} not found in any referenced table",
                    column.column, clause
                )));
            }
        }
    }

    Ok(())
}

/// A join endpoint as written: table (when qualified) and column
fn endpoint(outline: &SqlOutline, column: &ColumnRef) -> (Option<String>, String) {
    let table = column
        .qualifier
        .as_deref()
        .and_then(|q| outline.resolve_qualifier(q))
        .map(|t| t.table.to_lowercase());
    (table, column.column.to_lowercase())
}

fn endpoint_matches(actual: &(Option<String>, String), table: &str, column: &str) -> bool {
    actual.1 == column.to_lowercase()
        && actual.0.as_deref().map_or(true, |t| t == table.to_lowercase())
}

/// Does the ON clause state exactly the key mapping between `left` and `right`?
fn keys_match(
    actual: &[((Option<String>, String), (Option<String>, String))],
    left: &str,
    right: &str,
    keys: &[(String, String)],
) -> bool {
    if actual.len() != keys.len() {
        return false;
    }

    keys.iter().all(|(left_col, right_col)| {
        actual.iter().any(|(a, b)| {
            (endpoint_matches(a, left, left_col) && endpoint_matches(b, right, right_col))
                || (endpoint_matches(b, left, left_col) && endpoint_matches(a, right, right_col))
        })
    })
}

fn check_joins(snapshot: &RegistrySnapshot, outline: &SqlOutline) -> Result<(), ValidationError> {
    let mut joined: Vec<&TableMention> = outline.from.iter().collect();

    for join in &outline.joins {
        let target = &join.target.table;
        let actual: Vec<_> = join
            .equalities
            .iter()
            .map(|(a, b)| (endpoint(outline, a), endpoint(outline, b)))
            .collect();

        let mut related = false;
        let mut matched = false;

        for earlier in &joined {
            let source = &earlier.table;
            let candidates = [
                snapshot.relationship(source, target).map(|e| (source.as_str(), target.as_str(), e)),
                snapshot.relationship(target, source).map(|e| (target.as_str(), source.as_str(), e)),
            ];

            for (left, right, edge) in candidates.into_iter().flatten() {
                related = true;
                let keys: Vec<(String, String)> = edge
                    .keys
                    .iter()
                    .map(|(l, f)| (l.clone(), f.clone()))
                    .collect();
                if keys_match(&actual, left, right, &keys) {
                    matched = true;
                }
            }
        }

        if !related {
            return Err(ValidationError::failed(format!(
                "No relationship connects {} to the tables joined before it",
                target
            )));
        }
        if !matched {
            return Err(ValidationError::failed(format!(
                "Join condition for {} does not match the declared relationship keys",
                target
            )));
        }

        joined.push(&join.target);
    }

    Ok(())
}

fn check_aggregation(outline: &SqlOutline) -> Result<(), ValidationError> {
    let has_aggregate = outline.has_aggregate();
    if !has_aggregate && outline.group_by.is_empty() {
        return Ok(());
    }

    let grouped: Vec<(String, Vec<Option<String>>)> = outline
        .group_by
        .iter()
        .map(|g| (canonical_expression(g), source_tables(outline, g)))
        .collect();

    for (idx, item) in outline.select.iter().enumerate() {
        if item.is_aggregate() {
            continue;
        }

        let is_constant = item.expression != "*" && column_refs(&item.expression).is_empty();
        if is_constant {
            continue;
        }

        if outline.group_by.is_empty() {
            return Err(ValidationError::failed(format!(
                "SELECT item {} must be aggregated or listed in GROUP BY",
                item.expression
            )));
        }

        let ordinal = (idx + 1).to_string();
        let canonical = canonical_expression(&item.expression);
        let alias = item.alias.as_deref().map(canonical_expression);
        let sources = source_tables(outline, &item.expression);

        let is_grouped = grouped.iter().any(|(g, g_sources)| {
            *g == ordinal
                || alias.as_ref() == Some(g)
                || (*g == canonical && same_sources(&sources, g_sources))
        });

        if !is_grouped {
            return Err(ValidationError::failed(format!(
                "SELECT item {} is neither aggregated nor grouped",
                item.expression
            )));
        }
    }

    Ok(())
}

/// Table behind each column reference of an expression, `None` when the
/// reference is unqualified
fn source_tables(outline: &SqlOutline, expression: &str) -> Vec<Option<String>> {
    column_refs(expression)
        .into_iter()
        .map(|column| {
            column.qualifier.map(|q| {
                outline
                    .resolve_qualifier(&q)
                    .map(|mention| mention.table.clone())
                    .unwrap_or(q)
            })
        })
        .collect()
}

/// Unqualified references match any table
fn same_sources(a: &[Option<String>], b: &[Option<String>]) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| match (x, y) {
            (Some(x), Some(y)) => x.eq_ignore_ascii_case(y),
            _ => true,
        })
}

fn check_platform_predicates(
    snapshot: &RegistrySnapshot,
    outline: &SqlOutline,
) -> Result<(), ValidationError> {
    let predicates = outline.platform_predicates();
    if predicates.is_empty() {
        return Ok(());
    }

    let has_platform = outline
        .tables
        .iter()
        .any(|t| table_has_column(snapshot, &t.table, PLATFORM_COLUMN));

    if !has_platform {
        return Err(ValidationError::failed(
            "Platform filter used but no referenced table has a platform column",
        ));
    }

    Ok(())
}

fn check_placeholders(outline: &SqlOutline, params: &ParamMap) -> Result<(), ValidationError> {
    match outline
        .placeholders()
        .into_iter()
        .find(|name| !params.contains_key(name))
    {
        Some(missing) => Err(ValidationError::failed(format!(
            "Placeholder @{} has no parameter value",
            missing
        ))),
        None => Ok(()),
    }
}
