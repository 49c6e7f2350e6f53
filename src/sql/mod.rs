//! SQL generation and validation
//!
//! Target dialect is BigQuery Standard SQL: backtick-quoted
//! `project.dataset.table` references, `@name` placeholders and
//! `IN UNNEST(@array)` membership tests.

mod context;
mod generator;
pub mod inspect;
mod params;
mod validator;

pub use context::{JoinStep, MetricOrigin, QueryContext, SelectedMetric, TimeWindow};
pub use generator::{GeneratedQuery, GeneratorSettings, SqlGenerator};
pub use params::{ParamMap, ParamValue};
pub use validator::{SqlValidator, ValidatorSettings};
