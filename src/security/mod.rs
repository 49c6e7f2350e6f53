mod sql_guard;

pub use sql_guard::{scan, security_rules, SecurityRule};
