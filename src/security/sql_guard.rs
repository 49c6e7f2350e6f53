use regex::Regex;
use std::sync::LazyLock;
use tracing::error;

/// A pattern that rejects a statement outright
pub struct SecurityRule {
    pub name: &'static str,
    pattern: Regex,
}

impl SecurityRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap(),
        }
    }

    pub fn matches(&self, sql: &str) -> bool {
        self.pattern.is_match(sql)
    }
}

static RULES: LazyLock<Vec<SecurityRule>> = LazyLock::new(|| {
    vec![
        SecurityRule::new(
            "stacked_write_statement",
            r"(?i);\s*(?:DROP|DELETE|INSERT|UPDATE|MERGE)\b",
        ),
        SecurityRule::new("line_comment", r"--"),
        SecurityRule::new("block_comment", r"(?s)/\*.*?\*/"),
        SecurityRule::new("union_select", r"(?i)\bUNION\s+(?:ALL\s+)?SELECT\b"),
    ]
});

pub fn security_rules() -> &'static [SecurityRule] {
    &RULES
}

/// First rule the statement violates. The offending text is logged here and
/// never leaves this function.
pub fn scan(sql: &str) -> Option<&'static str> {
    let rule = RULES.iter().find(|rule| rule.matches(sql))?;
    error!(
        "SQL rejected by security rule {}: {}",
        rule.name,
        sql.replace('\n', " ")
    );
    Some(rule.name)
}
