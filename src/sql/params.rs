use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Named query parameters, keyed without the leading `@`
pub type ParamMap = BTreeMap<String, ParamValue>;

/// A typed parameter value as BigQuery understands it
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Array(Vec<ParamValue>),
    String(String),
}

impl ParamValue {
    pub fn string(value: impl Into<String>) -> Self {
        ParamValue::String(value.into())
    }

    pub fn string_array<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ParamValue::Array(values.into_iter().map(|v| ParamValue::String(v.into())).collect())
    }

    /// Type name of a non-array value
    pub fn scalar_type(&self) -> &'static str {
        match self {
            ParamValue::Bool(_) => "BOOL",
            ParamValue::Int(_) => "INT64",
            ParamValue::Float(_) => "FLOAT64",
            ParamValue::Timestamp(_) => "TIMESTAMP",
            ParamValue::Date(_) => "DATE",
            ParamValue::Array(_) => "ARRAY",
            ParamValue::String(_) => "STRING",
        }
    }

    /// Element type of an array; empty arrays are typed as strings
    pub fn element_type(items: &[ParamValue]) -> &'static str {
        items.first().map_or("STRING", ParamValue::scalar_type)
    }

    /// Full BigQuery type name, e.g. `ARRAY<STRING>`
    pub fn bigquery_type(&self) -> String {
        match self {
            ParamValue::Array(items) => format!("ARRAY<{}>", Self::element_type(items)),
            other => other.scalar_type().to_string(),
        }
    }

    /// Wire representation of a scalar. Arrays have none.
    pub fn scalar_string(&self) -> Option<String> {
        match self {
            ParamValue::Bool(b) => Some(b.to_string()),
            ParamValue::Int(i) => Some(i.to_string()),
            ParamValue::Float(f) => Some(f.to_string()),
            ParamValue::Timestamp(ts) => Some(ts.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ParamValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            ParamValue::Array(_) => None,
            ParamValue::String(s) => Some(s.clone()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::String(s) => Some(s),
            _ => None,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            ParamValue::Bool(b) => serde_json::Value::Bool(*b),
            ParamValue::Int(i) => serde_json::Value::from(*i),
            ParamValue::Float(f) => serde_json::Value::from(*f),
            ParamValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(ParamValue::to_json).collect())
            }
            other => serde_json::Value::String(other.scalar_string().unwrap_or_default()),
        }
    }
}

/// Serialized as `{"type": "ARRAY<STRING>", "value": [...]}`
impl Serialize for ParamValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut state = serializer.serialize_struct("ParamValue", 2)?;
        state.serialize_field("type", &self.bigquery_type())?;
        state.serialize_field("value", &self.to_json())?;
        state.end()
    }
}
