use regex::Regex;

/// Decides whether a request belongs to one query type.
pub trait ClassifierRule: Send + Sync {
    fn query_type(&self) -> &str;

    /// `text` is the raw request; rules do their own case handling.
    fn matches(&self, text: &str) -> bool;
}

/// Matches when any of its keyword patterns appears at a word start.
pub struct PatternRule {
    query_type: String,
    patterns: Vec<Regex>,
}

impl PatternRule {
    pub fn new(query_type: &str, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!(r"(?i)\b(?:{})", p)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            query_type: query_type.to_string(),
            patterns,
        })
    }
}

impl ClassifierRule for PatternRule {
    fn query_type(&self) -> &str {
        &self.query_type
    }

    fn matches(&self, text: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(text))
    }
}

const DEFAULT_RULES: &[(&str, &[&str])] = &[
    (
        "sales",
        &["sales", "revenue", "earnings", "income", "transactions", "orders", "purchases"],
    ),
    (
        "inventory",
        &["inventory", "stock", "products", "items", "availability"],
    ),
    (
        "customers",
        &["customers?", "buyers", "clients", "customer base", "shoppers"],
    ),
    (
        "performance",
        &["performance", "metrics", "analytics", "trends", "growth"],
    ),
];

/// Sales, inventory, customers, performance; first match wins.
pub fn default_rules() -> Vec<Box<dyn ClassifierRule>> {
    DEFAULT_RULES
        .iter()
        .filter_map(|(query_type, patterns)| PatternRule::new(query_type, patterns).ok())
        .map(|rule| Box::new(rule) as Box<dyn ClassifierRule>)
        .collect()
}
