//! SQL Generator
//!
//! Turns request text, a query type and a platform set into parameterized
//! BigQuery SQL:
//! 1. Find required tables and metrics from glossary terms and metric names
//! 2. Select a query template
//! 3. Resolve the time window against the primary table's date column
//! 4. Resolve joins through the relationship graph
//! 5. Fill the template and build the parameter map
//!
//! Generation never emits partial SQL. Anything it cannot decide without
//! guessing is a [`GenerationError`].

use crate::error::GenerationError;
use crate::registry::{QueryTemplate, RegistrySnapshot, DEFAULT_TEMPLATE};
use crate::sql::context::{JoinStep, MetricOrigin, QueryContext, SelectedMetric, TimeWindow};
use crate::sql::params::{ParamMap, ParamValue};
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap());

/// Interior run of spaces, e.g. left behind by an empty `{joins}`
static SPACE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\S)[ \t]{2,}").unwrap());

/// Placeholders a template may use
const KNOWN_PLACEHOLDERS: &[&str] = &[
    "table",
    "joins",
    "metrics",
    "date_condition",
    "platform_condition",
];

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub project_id: String,
    pub dataset: String,
    /// Length of the trailing window used when no time phrase matches
    pub default_window_days: i64,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            project_id: "project".to_string(),
            dataset: "commerce".to_string(),
            default_window_days: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedQuery {
    pub sql: String,
    pub params: ParamMap,
    pub tables: Vec<String>,
    pub context: QueryContext,
}

pub struct SqlGenerator {
    settings: GeneratorSettings,
}

impl SqlGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Fully qualified, backtick-quoted table reference
    pub fn table_reference(&self, table: &str) -> String {
        format!(
            "`{}.{}.{}`",
            self.settings.project_id, self.settings.dataset, table
        )
    }

    pub fn generate_query(
        &self,
        snapshot: &RegistrySnapshot,
        text: &str,
        platforms: &[String],
        query_type: Option<&str>,
    ) -> Result<GeneratedQuery, GenerationError> {
        self.generate_query_at(snapshot, text, platforms, query_type, Utc::now())
    }

    /// Same as [`generate_query`](Self::generate_query) with an explicit
    /// reference instant for time windows.
    pub fn generate_query_at(
        &self,
        snapshot: &RegistrySnapshot,
        text: &str,
        platforms: &[String],
        query_type: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<GeneratedQuery, GenerationError> {
        let lowered = text.to_lowercase();

        let (mut required_tables, mut metrics) = identify_requirements(snapshot, &lowered, query_type);
        if required_tables.is_empty() {
            return Err(GenerationError::NoTables);
        }

        let template = select_template(snapshot, query_type, &metrics)?;
        debug!("Selected template {} (type={})", template.name, template.query_type);

        if metrics.is_empty() {
            metrics = template_metrics(snapshot, template);
            for metric in &metrics {
                if !required_tables.contains(&metric.table) {
                    required_tables.push(metric.table.clone());
                }
            }
            required_tables.sort_by_key(|t| snapshot.table_index(t).unwrap_or(usize::MAX));
        }

        if metrics.is_empty() && template.template.contains("{metrics}") {
            return Err(GenerationError::NoMetrics {
                template: template.name.clone(),
            });
        }

        if let Some(placeholder) = PLACEHOLDER_RE
            .captures_iter(&template.template)
            .map(|cap| cap[1].to_string())
            .find(|p| !KNOWN_PLACEHOLDERS.contains(&p.as_str()))
        {
            return Err(GenerationError::UnresolvedPlaceholder {
                template: template.name.clone(),
                placeholder,
            });
        }

        // The template's own table anchors the query when it is required
        let primary_table = if required_tables.contains(&template.table) {
            template.table.clone()
        } else {
            required_tables[0].clone()
        };

        let time_window = self.resolve_time_window(snapshot, &lowered, &primary_table, now)?;
        let joins = resolve_joins(snapshot, &primary_table, &required_tables)?;

        let context = QueryContext {
            query_type: query_type.map(String::from),
            required_tables,
            primary_table,
            metrics,
            time_window,
            joins,
            template: template.name.clone(),
        };

        let platform_filter = platform_condition(snapshot, template, &context.referenced_tables(), platforms)?;
        let sql = self.build_sql(snapshot, template, &context, &platform_filter);
        let params = build_params(&context.time_window, platforms);
        let tables = context.referenced_tables();

        info!(
            "Generated query from template {} over {} table(s), window {}..{}",
            context.template,
            tables.len(),
            context.time_window.start,
            context.time_window.end
        );
        debug!("Generated SQL:\n{}", sql);

        Ok(GeneratedQuery {
            sql,
            params,
            tables,
            context,
        })
    }

    fn resolve_time_window(
        &self,
        snapshot: &RegistrySnapshot,
        text: &str,
        table: &str,
        now: DateTime<Utc>,
    ) -> Result<TimeWindow, GenerationError> {
        let no_date = || GenerationError::NoDateColumn {
            table: table.to_string(),
        };

        let column = snapshot
            .get_table_schema(table)
            .and_then(|schema| schema.date_column())
            .ok_or_else(no_date)?;

        let (pattern, (start, end)) = match snapshot.time_patterns().iter().find(|p| p.matches(text)) {
            Some(pattern) => (Some(pattern.name.to_string()), pattern.resolve(now)),
            None => {
                let end = now.date_naive();
                (None, (end - Duration::days(self.settings.default_window_days), end))
            }
        };

        Ok(TimeWindow {
            pattern,
            start,
            end,
            table: table.to_string(),
            column: column.name.clone(),
        })
    }

    fn build_sql(
        &self,
        snapshot: &RegistrySnapshot,
        template: &QueryTemplate,
        context: &QueryContext,
        platform_filter: &str,
    ) -> String {
        let metrics = context
            .metrics
            .iter()
            .map(SelectedMetric::render)
            .collect::<Vec<_>>()
            .join(", ");

        let joins = context
            .joins
            .iter()
            .map(|step| self.render_join(step))
            .collect::<Vec<_>>()
            .join("\n");

        let filled = template
            .template
            .replace("{table}", &self.table_reference(&context.primary_table))
            .replace("{joins}", &joins)
            .replace("{metrics}", &metrics)
            .replace("{date_condition}", &date_condition(snapshot, &context.time_window))
            .replace("{platform_condition}", platform_filter);

        filled
            .lines()
            .map(|line| SPACE_RUN_RE.replace_all(line.trim_end(), "$1 ").into_owned())
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn render_join(&self, step: &JoinStep) -> String {
        let on = step
            .keys
            .iter()
            .map(|(from_col, to_col)| format!("{}.{} = {}.{}", step.from, from_col, step.to, to_col))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!("JOIN {} ON {}", self.table_reference(&step.to), on)
    }
}

/// Case-insensitive substring match on the raw name or with `_` read as space.
/// `text` must already be lowercase.
fn mentions(text: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    text.contains(&name) || text.contains(&name.replace('_', " "))
}

fn normalize_expression(expr: &str) -> String {
    expr.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Tables (in registry order) and metrics the text asks for. Defined metrics
/// come before column aggregations.
fn identify_requirements(
    snapshot: &RegistrySnapshot,
    text: &str,
    query_type: Option<&str>,
) -> (Vec<String>, Vec<SelectedMetric>) {
    let mut tables: HashSet<String> = HashSet::new();
    let mut metrics: Vec<SelectedMetric> = Vec::new();

    for metric in snapshot.metric_definitions() {
        if mentions(text, &metric.name) {
            tables.insert(metric.table.clone());
            metrics.push(SelectedMetric {
                name: metric.name.clone(),
                expression: metric.sql_template.trim().to_string(),
                table: metric.table.clone(),
                origin: MetricOrigin::Defined,
            });
        }
    }

    let mut column_metrics: Vec<SelectedMetric> = Vec::new();
    for schema in snapshot.tables() {
        for column in &schema.columns {
            let Some(term) = column.business_term.as_deref().map(str::trim) else {
                continue;
            };
            if term.is_empty() || !text.contains(&term.to_lowercase()) {
                continue;
            }
            tables.insert(schema.table_name.clone());

            for rule in &column.aggregation_rules {
                let expression = format!("{}({})", rule.trim().to_uppercase(), column.name);
                let normalized = normalize_expression(&expression);
                if metrics
                    .iter()
                    .any(|m| normalize_expression(&m.expression) == normalized)
                {
                    debug!("Column metric {} already requested as a defined metric", expression);
                    continue;
                }

                let name = format!("{}_{}", rule.trim().to_lowercase(), column.name);
                if column_metrics.iter().any(|m| m.name == name) {
                    continue;
                }
                column_metrics.push(SelectedMetric {
                    name,
                    expression,
                    table: schema.table_name.clone(),
                    origin: MetricOrigin::Column,
                });
            }
        }
    }
    metrics.extend(column_metrics);

    if let Some(query_type) = query_type {
        tables.extend(snapshot.get_tables_for_query_type(query_type));
    }

    let mut ordered: Vec<String> = tables.into_iter().collect();
    ordered.sort_by_key(|t| snapshot.table_index(t).unwrap_or(usize::MAX));

    (ordered, metrics)
}

/// Query type match, then the first template covering every requested
/// defined metric, then the `default` template.
fn select_template<'a>(
    snapshot: &'a RegistrySnapshot,
    query_type: Option<&str>,
    requested: &[SelectedMetric],
) -> Result<&'a QueryTemplate, GenerationError> {
    if let Some(query_type) = query_type {
        if let Some(template) = snapshot
            .query_templates()
            .find(|t| t.query_type == query_type)
        {
            return Ok(template);
        }
    }

    let requested: Vec<&str> = requested
        .iter()
        .filter(|m| m.origin == MetricOrigin::Defined)
        .map(|m| m.name.as_str())
        .collect();

    if !requested.is_empty() {
        if let Some(template) = snapshot
            .query_templates()
            .find(|t| requested.iter().all(|name| t.metrics.iter().any(|m| m == name)))
        {
            return Ok(template);
        }
    }

    snapshot
        .get_query_template(DEFAULT_TEMPLATE)
        .ok_or_else(|| GenerationError::NoTemplate {
            query_type: query_type.map(String::from),
        })
}

fn template_metrics(snapshot: &RegistrySnapshot, template: &QueryTemplate) -> Vec<SelectedMetric> {
    template
        .metrics
        .iter()
        .filter_map(|name| match snapshot.get_metric_definition(name) {
            Some(def) => Some(SelectedMetric {
                name: def.name.clone(),
                expression: def.sql_template.trim().to_string(),
                table: def.table.clone(),
                origin: MetricOrigin::Template,
            }),
            None => {
                warn!("Template {} requires unknown metric {}", template.name, name);
                None
            }
        })
        .collect()
}

/// Join every required table onto the primary one. Each table is reached from
/// the previously required table when a directed path exists, otherwise from
/// any joined table in either direction.
fn resolve_joins(
    snapshot: &RegistrySnapshot,
    primary: &str,
    tables: &[String],
) -> Result<Vec<JoinStep>, GenerationError> {
    let mut joined: Vec<String> = vec![primary.to_string()];
    let mut steps = Vec::new();
    let mut previous = primary.to_string();

    for table in tables {
        if joined.contains(table) {
            continue;
        }

        let no_path = || GenerationError::NoJoinPath {
            from: previous.clone(),
            to: table.clone(),
        };

        let path = find_join_path(snapshot, &previous, &joined, table).ok_or_else(no_path)?;

        for pair in path.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            if joined.contains(to) {
                continue;
            }
            let step = join_step(snapshot, from, to).ok_or_else(no_path)?;
            debug!("Join {} -> {} ({})", step.from, step.to, step.relationship_type);
            steps.push(step);
            joined.push(to.clone());
        }

        previous = table.clone();
    }

    Ok(steps)
}

fn find_join_path(
    snapshot: &RegistrySnapshot,
    previous: &str,
    joined: &[String],
    target: &str,
) -> Option<Vec<String>> {
    let starts: Vec<&str> = std::iter::once(previous)
        .chain(joined.iter().map(String::as_str).filter(|t| *t != previous))
        .collect();

    starts
        .iter()
        .find_map(|start| snapshot.get_relationship_path(start, target))
        .or_else(|| {
            starts.iter().find_map(|start| {
                snapshot.get_relationship_path(target, start).map(|mut path| {
                    path.reverse();
                    path
                })
            })
        })
}

fn join_step(snapshot: &RegistrySnapshot, from: &str, to: &str) -> Option<JoinStep> {
    let (edge, reversed) = match snapshot.relationship(from, to) {
        Some(edge) => (edge, false),
        None => (snapshot.relationship(to, from)?, true),
    };

    if edge.keys.is_empty() {
        warn!("Relationship between {} and {} declares no join keys", from, to);
        return None;
    }

    let keys = edge
        .keys
        .iter()
        .map(|(local, foreign)| {
            if reversed {
                (foreign.clone(), local.clone())
            } else {
                (local.clone(), foreign.clone())
            }
        })
        .collect();

    Some(JoinStep {
        from: from.to_string(),
        to: to.to_string(),
        relationship_type: edge.relationship_type.clone(),
        keys,
    })
}

fn date_condition(snapshot: &RegistrySnapshot, window: &TimeWindow) -> String {
    let field = format!("{}.{}", window.table, window.column);
    let is_timestamp = snapshot
        .get_column_type(&window.table, &window.column)
        .is_some_and(|ty| matches!(ty.to_ascii_uppercase().as_str(), "TIMESTAMP" | "DATETIME"));

    if is_timestamp {
        format!("DATE({}) BETWEEN @start_date AND @end_date", field)
    } else {
        format!("{} BETWEEN @start_date AND @end_date", field)
    }
}

/// Membership test on the first referenced table carrying a `platform`
/// column. Requested platforms are never dropped: a template or table set
/// that cannot filter by platform is an error.
fn platform_condition(
    snapshot: &RegistrySnapshot,
    template: &QueryTemplate,
    tables: &[String],
    platforms: &[String],
) -> Result<String, GenerationError> {
    if platforms.is_empty() {
        return Ok("1=1".to_string());
    }

    let unavailable = || GenerationError::PlatformFilterUnavailable {
        template: template.name.clone(),
        tables: tables.to_vec(),
    };

    if !template.template.contains("{platform_condition}") {
        return Err(unavailable());
    }

    tables
        .iter()
        .find(|t| {
            snapshot
                .get_table_schema(t)
                .is_some_and(|schema| schema.has_column("platform"))
        })
        .map(|table| format!("{}.platform IN UNNEST(@platforms)", table))
        .ok_or_else(unavailable)
}

fn build_params(window: &TimeWindow, platforms: &[String]) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("start_date".to_string(), ParamValue::Date(window.start));
    params.insert("end_date".to_string(), ParamValue::Date(window.end));
    params.insert(
        "platforms".to_string(),
        ParamValue::string_array(platforms.iter().cloned()),
    );
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{RawDocument, SourceContents};
    use crate::test_support::{fixed_now, fixture_snapshot, platforms};
    use chrono::NaiveDate;

    fn generator() -> SqlGenerator {
        SqlGenerator::new(GeneratorSettings {
            project_id: "proj".to_string(),
            dataset: "commerce".to_string(),
            default_window_days: 30,
        })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snapshot_of(docs: &[(&str, &str)]) -> RegistrySnapshot {
        RegistrySnapshot::build(SourceContents {
            documents: docs
                .iter()
                .map(|(name, content)| {
                    RawDocument::yaml("consolidated", &format!("consolidated/{}.yaml", name), content)
                })
                .collect(),
            unreadable: Vec::new(),
        })
    }

    #[test]
    fn test_total_sales_last_month() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(
                &snapshot,
                "What were my total sales last month?",
                &platforms(&["shopify", "amazon"]),
                Some("sales"),
                fixed_now(),
            )
            .unwrap();

        assert!(query.sql.contains("SUM(total_amount) AS total_sales"));
        assert!(query.sql.contains("FROM `proj.commerce.orders`"));
        assert!(query
            .sql
            .contains("orders.order_date BETWEEN @start_date AND @end_date"));
        assert!(query.sql.contains("orders.platform IN UNNEST(@platforms)"));
        assert!(!query.sql.contains('{'));
        assert_eq!(query.tables, vec!["orders"]);
        assert_eq!(query.context.template, "sales_by_platform");

        assert_eq!(query.params["start_date"], ParamValue::Date(date(2024, 2, 1)));
        assert_eq!(query.params["end_date"], ParamValue::Date(date(2024, 2, 29)));
        assert_eq!(
            query.params["platforms"],
            ParamValue::string_array(["shopify", "amazon"])
        );
    }

    #[test]
    fn test_column_metric_skipped_when_defined_metric_matches() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(&snapshot, "total sales last week", &[], Some("sales"), fixed_now())
            .unwrap();

        assert!(query.sql.contains("AVG(total_amount) AS avg_total_amount"));
        assert!(!query.sql.contains("sum_total_amount"));
        assert_eq!(query.context.metrics[0].origin, MetricOrigin::Defined);
    }

    #[test]
    fn test_no_platforms_uses_tautology() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(&snapshot, "total sales", &[], Some("sales"), fixed_now())
            .unwrap();

        assert!(query.sql.contains("AND 1=1"));
        assert_eq!(query.params["platforms"], ParamValue::Array(vec![]));
    }

    #[test]
    fn test_default_window_without_time_phrase() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(&snapshot, "total sales", &[], Some("sales"), fixed_now())
            .unwrap();

        assert_eq!(query.context.time_window.pattern, None);
        assert_eq!(query.params["start_date"], ParamValue::Date(date(2024, 2, 14)));
        assert_eq!(query.params["end_date"], ParamValue::Date(date(2024, 3, 15)));
    }

    #[test]
    fn test_template_metrics_used_when_none_requested() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(
                &snapshot,
                "how are categories performing this quarter",
                &platforms(&["ebay"]),
                Some("performance"),
                fixed_now(),
            )
            .unwrap();

        assert_eq!(query.context.template, "performance_by_category");
        assert!(query.sql.contains("SUM(total_amount) AS total_sales, COUNT(DISTINCT order_id) AS order_count"));
        assert!(query
            .sql
            .contains("JOIN `proj.commerce.products` ON orders.product_id = products.product_id"));
        assert_eq!(query.tables, vec!["orders", "products"]);
    }

    #[test]
    fn test_join_to_customers_via_business_term() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(
                &snapshot,
                "total sales by customer name",
                &platforms(&["shopify"]),
                Some("sales"),
                fixed_now(),
            )
            .unwrap();

        assert_eq!(query.context.joins.len(), 1);
        assert_eq!(query.context.joins[0].from, "orders");
        assert_eq!(query.context.joins[0].to, "customers");
        assert!(query
            .sql
            .contains("JOIN `proj.commerce.customers` ON orders.customer_id = customers.customer_id"));
    }

    #[test]
    fn test_reverse_edge_join_from_template_table() {
        let snapshot = fixture_snapshot();
        let query = generator()
            .generate_query_at(&snapshot, "stock levels", &[], Some("inventory"), fixed_now())
            .unwrap();

        assert_eq!(query.context.primary_table, "inventory");
        assert!(query.sql.contains("FROM `proj.commerce.inventory`"));
        assert!(query
            .sql
            .contains("JOIN `proj.commerce.products` ON inventory.product_id = products.product_id"));
        assert!(query
            .sql
            .contains("inventory.snapshot_date BETWEEN @start_date AND @end_date"));
    }

    #[test]
    fn test_no_tables() {
        let snapshot = fixture_snapshot();
        let err = generator()
            .generate_query_at(&snapshot, "hello there", &[], None, fixed_now())
            .unwrap_err();
        assert_eq!(err, GenerationError::NoTables);
    }

    #[test]
    fn test_template_without_metrics_fails() {
        let snapshot = fixture_snapshot();
        let err = generator()
            .generate_query_at(&snapshot, "list every customer name", &[], None, fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::NoMetrics {
                template: "default".to_string()
            }
        );
    }

    #[test]
    fn test_missing_date_column() {
        let snapshot = snapshot_of(&[(
            "regions",
            r#"
table_name: regions
columns:
  - {name: region, type: STRING}
common_metrics:
  - {name: region_count, sql_template: COUNT(region)}
query_templates:
  - {name: default, template: "SELECT {metrics} FROM {table} WHERE {date_condition}"}
query_types: [geo]
"#,
        )]);

        let err = generator()
            .generate_query_at(&snapshot, "region count", &[], Some("geo"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::NoDateColumn {
                table: "regions".to_string()
            }
        );
    }

    const REFUNDS: &str = r#"
table_name: refunds
date_column: refund_date
columns:
  - {name: refund_id, type: STRING}
  - {name: refund_date, type: DATE}
  - {name: amount, type: NUMERIC}
common_metrics:
  - {name: refund_total, sql_template: SUM(amount)}
query_templates:
  - name: default
    template: "SELECT {metrics} FROM {table} {joins} WHERE {date_condition} AND {platform_condition}"
query_types: [refunds]
"#;

    #[test]
    fn test_platforms_without_platform_column_fail() {
        let snapshot = snapshot_of(&[("refunds", REFUNDS)]);

        let err = generator()
            .generate_query_at(&snapshot, "refund total last month", &platforms(&["shopify"]), Some("refunds"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::PlatformFilterUnavailable {
                template: "default".to_string(),
                tables: vec!["refunds".to_string()],
            }
        );
    }

    #[test]
    fn test_platforms_need_platform_placeholder() {
        let snapshot = snapshot_of(&[(
            "visits",
            r#"
table_name: visits
columns:
  - {name: visit_date, type: DATE}
  - {name: platform, type: STRING}
common_metrics:
  - {name: visit_count, sql_template: COUNT(*)}
query_templates:
  - {name: default, template: "SELECT {metrics} FROM {table} WHERE {date_condition}"}
query_types: [traffic]
"#,
        )]);

        let err = generator()
            .generate_query_at(&snapshot, "visit count", &platforms(&["ebay"]), Some("traffic"), fixed_now())
            .unwrap_err();
        assert!(matches!(err, GenerationError::PlatformFilterUnavailable { .. }));

        let query = generator()
            .generate_query_at(&snapshot, "visit count", &[], Some("traffic"), fixed_now())
            .unwrap();
        assert!(!query.sql.contains("platform"));
    }

    #[test]
    fn test_empty_joins_leave_single_spaces() {
        let snapshot = snapshot_of(&[("refunds", REFUNDS)]);
        let query = generator()
            .generate_query_at(&snapshot, "refund total", &[], Some("refunds"), fixed_now())
            .unwrap();

        assert!(query.sql.contains("`proj.commerce.refunds` WHERE refunds.refund_date BETWEEN"), "{}", query.sql);
        assert!(!query.sql.contains("  "), "{}", query.sql);
    }

    #[test]
    fn test_unreachable_join() {
        let snapshot = snapshot_of(&[
            (
                "visits",
                r#"
table_name: visits
columns:
  - {name: visit_date, type: DATE}
common_metrics:
  - {name: visit_count, sql_template: COUNT(*)}
query_templates:
  - {name: default, template: "SELECT {metrics} FROM {table} {joins} WHERE {date_condition}"}
query_types: [traffic]
"#,
            ),
            (
                "campaigns",
                "table_name: campaigns\ncolumns:\n  - {name: start_date, type: DATE}\nquery_types: [traffic]\n",
            ),
        ]);

        let err = generator()
            .generate_query_at(&snapshot, "visit count", &[], Some("traffic"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::NoJoinPath {
                from: "visits".to_string(),
                to: "campaigns".to_string()
            }
        );
    }

    #[test]
    fn test_no_template() {
        let snapshot = snapshot_of(&[(
            "visits",
            "table_name: visits\ncolumns:\n  - {name: visit_date, type: DATE}\nquery_types: [traffic]\n",
        )]);

        let err = generator()
            .generate_query_at(&snapshot, "visits", &[], Some("traffic"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::NoTemplate {
                query_type: Some("traffic".to_string())
            }
        );
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let snapshot = snapshot_of(&[(
            "visits",
            r#"
table_name: visits
columns:
  - {name: visit_date, type: DATE}
common_metrics:
  - {name: visit_count, sql_template: COUNT(*)}
query_templates:
  - name: by_region
    type: traffic
    template: "SELECT {region}, {metrics} FROM {table} WHERE {date_condition}"
query_types: [traffic]
"#,
        )]);

        let err = generator()
            .generate_query_at(&snapshot, "visit count", &[], Some("traffic"), fixed_now())
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::UnresolvedPlaceholder {
                template: "by_region".to_string(),
                placeholder: "region".to_string()
            }
        );
    }

    #[test]
    fn test_timestamp_date_column_is_cast() {
        let snapshot = snapshot_of(&[(
            "sessions",
            r#"
table_name: sessions
columns:
  - {name: started_at, type: TIMESTAMP}
common_metrics:
  - {name: session_count, sql_template: COUNT(*)}
query_templates:
  - {name: default, template: "SELECT {metrics} FROM {table} WHERE {date_condition}"}
"#,
        )]);

        let query = generator()
            .generate_query_at(&snapshot, "session count yesterday", &[], None, fixed_now())
            .unwrap();
        assert!(query
            .sql
            .contains("DATE(sessions.started_at) BETWEEN @start_date AND @end_date"));
        assert_eq!(query.params["start_date"], ParamValue::Date(date(2024, 3, 14)));
    }
}
