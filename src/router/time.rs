use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Relative phrases, most specific first. Matched against lowercased text.
static RELATIVE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\blast (?:day|week|month|quarter|year)\b",
        r"\bthis (?:week|month|quarter|year)\b",
        r"\bpast \d+ (?:days|weeks|months|years)\b",
        r"\bbetween\b.*\band\b",
        r"\bsince\b",
        r"\bcurrent\b",
        r"\bytd\b",
        r"\b(?:daily|weekly|monthly|quarterly|yearly)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).unwrap())
    .collect()
});

static DATE_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:\d{4}-\d{2}-\d{2}|\d{2}/\d{2}/\d{4})\b").unwrap());

/// Temporal hints pulled out of a request
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_range: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub specific_dates: Vec<String>,
}

impl TimeContext {
    pub fn is_empty(&self) -> bool {
        self.time_range.is_none() && self.specific_dates.is_empty()
    }
}

pub fn extract_time_context(text: &str) -> TimeContext {
    let lowered = text.to_lowercase();

    let time_range = RELATIVE_PATTERNS
        .iter()
        .find_map(|p| p.find(&lowered))
        .map(|m| m.as_str().to_string());

    let specific_dates = DATE_LITERAL
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect();

    TimeContext {
        time_range,
        specific_dates,
    }
}
