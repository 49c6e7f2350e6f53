use chrono::NaiveDate;
use serde::Serialize;

/// One aggregate expression in the SELECT list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedMetric {
    pub name: String,
    pub expression: String,
    pub table: String,
    pub origin: MetricOrigin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOrigin {
    /// A named entry in `common_metrics`
    Defined,
    /// A column aggregation rule
    Column,
    /// Pulled from the selected template's required metrics
    Template,
}

impl SelectedMetric {
    pub fn render(&self) -> String {
        format!("{} AS {}", self.expression, self.name)
    }
}

/// `JOIN to ON from.a = to.b`, where `from` is already part of the query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinStep {
    pub from: String,
    pub to: String,
    pub relationship_type: String,
    /// (column on `from`, column on `to`)
    pub keys: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeWindow {
    /// Name of the matched time pattern, `None` for the default window
    pub pattern: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub table: String,
    pub column: String,
}

/// Everything generation decided for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryContext {
    pub query_type: Option<String>,
    pub required_tables: Vec<String>,
    pub primary_table: String,
    pub metrics: Vec<SelectedMetric>,
    pub time_window: TimeWindow,
    pub joins: Vec<JoinStep>,
    pub template: String,
}

impl QueryContext {
    /// Tables referenced by the final SQL, primary first then in join order
    pub fn referenced_tables(&self) -> Vec<String> {
        let mut tables = vec![self.primary_table.clone()];
        tables.extend(self.joins.iter().map(|j| j.to.clone()));
        tables
    }
}
