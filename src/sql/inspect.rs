//! Structural reading of a single SELECT statement.
//!
//! This is deliberately not a full SQL parser. It reads the shape the
//! generator emits: one SELECT with FROM, optional JOIN ... ON, WHERE,
//! GROUP BY and HAVING at the top level.

use regex::Regex;
use std::sync::LazyLock;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static EXTRACT_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bEXTRACT\s*\(\s*\w+\s+FROM\b").unwrap());

static TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:FROM|JOIN)\s+(`[^`]+`|[A-Za-z_][\w.\-]*)").unwrap()
});

static JOIN_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:LEFT|RIGHT|FULL|INNER|CROSS)\s+)?(?:OUTER\s+)?JOIN\b").unwrap()
});

static PRIMARY_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(`[^`]+`|[A-Za-z_][\w.\-]*)(?:\s+(?:AS\s+)?([A-Za-z_]\w*))?").unwrap()
});

static JOIN_SEGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*(`[^`]+`|[A-Za-z_][\w.\-]*)(?:\s+(?:AS\s+)?([A-Za-z_]\w*))?\s+ON\s+(.+)$")
        .unwrap()
});

static EQUALITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)\s*=\s*([A-Za-z_]\w*(?:\.[A-Za-z_]\w*)*)").unwrap()
});

static EXPLICIT_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)^(.+?)\s+AS\s+([A-Za-z_]\w*)$").unwrap());

static IMPLICIT_ALIAS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(.*[\w)`])\s+([A-Za-z_]\w*)$").unwrap());

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@@?\w+").unwrap());

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^@\w])@([A-Za-z_]\w*)").unwrap());

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?\b").unwrap());

static BACKTICK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`[^`]*`").unwrap());

static QUALIFIED_STAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z_]\w*\.\*").unwrap());

static IDENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*)(\s*\()?").unwrap()
});

static AGGREGATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:COUNT|SUM|AVG|MIN|MAX|COUNTIF|ARRAY_AGG|STRING_AGG|ANY_VALUE|APPROX_COUNT_DISTINCT|LOGICAL_AND|LOGICAL_OR)\s*\(",
    )
    .unwrap()
});

static PLATFORM_PREDICATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:([A-Za-z_]\w*)\.)?platform\s*(?:=|!=|<>|\bIN\b)").unwrap()
});

const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "GROUP BY", "HAVING", "QUALIFY", "WINDOW", "ORDER BY", "LIMIT",
];

/// Words that are never column names
const RESERVED: &[&str] = &[
    "ALL", "AND", "ANY", "AS", "ASC", "BETWEEN", "BOOL", "BOOLEAN", "BY", "CASE", "CAST", "CROSS",
    "CURRENT", "DATE", "DATETIME", "DAY", "DESC", "DISTINCT", "ELSE", "END", "ESCAPE", "EXISTS",
    "FALSE", "FLOAT64", "FOLLOWING", "FROM", "FULL", "GROUP", "HAVING", "HOUR", "IGNORE", "IN",
    "INNER", "INT64", "INTERVAL", "IS", "JOIN", "LEFT", "LIKE", "LIMIT", "MINUTE", "MONTH", "NOT",
    "NULL", "NULLS", "NUMERIC", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "QUARTER", "RANGE", "RIGHT", "ROW", "ROWS", "SECOND", "SELECT", "STRING", "THEN",
    "TIMESTAMP", "TRUE", "UNBOUNDED", "UNNEST", "WEEK", "WHEN", "WHERE", "YEAR",
];

pub fn is_reserved(word: &str) -> bool {
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(word))
}

/// `qualifier.column` or a bare column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub column: String,
}

impl ColumnRef {
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.rsplitn(3, '.');
        let column = parts.next().unwrap_or_default().to_string();
        let qualifier = parts.next().map(String::from);
        ColumnRef { qualifier, column }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{}.{}", q, self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

/// A table named after FROM or JOIN
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMention {
    /// Reference as written, without backticks
    pub reference: String,
    /// Last path segment
    pub table: String,
    pub alias: Option<String>,
}

impl TableMention {
    fn new(raw: &str, alias: Option<&str>) -> Self {
        let reference = raw.trim().trim_matches('`').to_string();
        let table = reference
            .rsplit('.')
            .next()
            .unwrap_or(&reference)
            .to_string();
        TableMention {
            reference,
            table,
            alias: alias
                .filter(|a| !is_reserved(a))
                .map(String::from),
        }
    }

    /// Whether `qualifier` names this table in column references
    pub fn answers_to(&self, qualifier: &str) -> bool {
        match &self.alias {
            Some(alias) => alias.eq_ignore_ascii_case(qualifier) || self.table.eq_ignore_ascii_case(qualifier),
            None => self.table.eq_ignore_ascii_case(qualifier),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub target: TableMention,
    pub equalities: Vec<(ColumnRef, ColumnRef)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expression: String,
    pub alias: Option<String>,
}

impl SelectItem {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if let Some(cap) = EXPLICIT_ALIAS_RE.captures(raw) {
            return SelectItem {
                expression: cap[1].trim().to_string(),
                alias: Some(cap[2].to_string()),
            };
        }
        if let Some(cap) = IMPLICIT_ALIAS_RE.captures(raw) {
            if !is_reserved(&cap[2]) {
                return SelectItem {
                    expression: cap[1].trim().to_string(),
                    alias: Some(cap[2].to_string()),
                };
            }
        }
        SelectItem {
            expression: raw.to_string(),
            alias: None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        is_aggregate(&self.expression)
    }
}

/// Top-level pieces of one SELECT statement
#[derive(Debug, Clone, Default)]
pub struct SqlOutline {
    /// Literals blanked and whitespace collapsed
    pub normalized: String,
    pub tables: Vec<TableMention>,
    pub select: Vec<SelectItem>,
    pub from: Option<TableMention>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<String>,
    pub group_by: Vec<String>,
    pub having: Option<String>,
}

impl SqlOutline {
    pub fn parse(sql: &str) -> Self {
        let normalized = normalize(sql);
        let mut outline = SqlOutline {
            tables: extract_tables(&normalized),
            ..Default::default()
        };

        for (keyword, body) in top_level_clauses(&normalized) {
            match keyword {
                "SELECT" => {
                    let body = strip_leading_keyword(&body, "DISTINCT");
                    outline.select = split_top_level(body)
                        .iter()
                        .map(|item| SelectItem::parse(item))
                        .collect();
                }
                "FROM" => {
                    let (from, joins) = parse_from_clause(&body);
                    outline.from = from;
                    outline.joins = joins;
                }
                "WHERE" => outline.where_clause = Some(body),
                "GROUP BY" => outline.group_by = split_top_level(&body),
                "HAVING" => outline.having = Some(body),
                _ => {}
            }
        }

        outline.normalized = normalized;
        outline
    }

    /// FROM target followed by JOIN targets
    pub fn joined_tables(&self) -> impl Iterator<Item = &TableMention> {
        self.from.iter().chain(self.joins.iter().map(|j| &j.target))
    }

    /// Mention named by a column qualifier (table name or alias)
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<&TableMention> {
        self.joined_tables()
            .find(|t| t.answers_to(qualifier))
            .or_else(|| self.tables.iter().find(|t| t.answers_to(qualifier)))
    }

    pub fn select_aliases(&self) -> Vec<&str> {
        self.select
            .iter()
            .filter_map(|item| item.alias.as_deref())
            .collect()
    }

    pub fn has_aggregate(&self) -> bool {
        self.select.iter().any(SelectItem::is_aggregate)
    }

    /// Qualifier of every platform predicate (`None` when unqualified)
    pub fn platform_predicates(&self) -> Vec<Option<String>> {
        PLATFORM_PREDICATE_RE
            .captures_iter(&self.normalized)
            .map(|cap| cap.get(1).map(|q| q.as_str().to_string()))
            .collect()
    }

    /// Names of every `@name` placeholder, in order of appearance
    pub fn placeholders(&self) -> Vec<String> {
        PLACEHOLDER_RE
            .captures_iter(&self.normalized)
            .map(|cap| cap[1].to_string())
            .collect()
    }
}

/// Blank string literals and collapse whitespace
pub fn normalize(sql: &str) -> String {
    let stripped = strip_string_literals(sql);
    WHITESPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

fn strip_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();

    while let Some(c) = chars.next() {
        if c == '\'' || c == '"' {
            let quote = c;
            let mut escaped = false;
            for inner in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if inner == '\\' {
                    escaped = true;
                } else if inner == quote {
                    break;
                }
            }
            out.push(quote);
            out.push(quote);
        } else {
            out.push(c);
        }
    }

    out
}

/// Every table after FROM or JOIN, subqueries included
pub fn extract_tables(normalized: &str) -> Vec<TableMention> {
    let cleaned = EXTRACT_FROM_RE.replace_all(normalized, "EXTRACT(");
    let mut tables: Vec<TableMention> = Vec::new();

    for cap in TABLE_RE.captures_iter(&cleaned) {
        let Some(m) = cap.get(1) else { continue };
        let followed_by_paren = cleaned[m.end()..].trim_start().starts_with('(');
        if followed_by_paren || m.as_str().eq_ignore_ascii_case("UNNEST") {
            continue;
        }

        let mention = TableMention::new(m.as_str(), None);
        if !tables.iter().any(|t| t.reference == mention.reference) {
            tables.push(mention);
        }
    }

    tables
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'@' || b == b'.'
}

fn keyword_at(upper: &[u8], i: usize) -> Option<&'static str> {
    if i > 0 && is_ident_byte(upper[i - 1]) {
        return None;
    }
    CLAUSE_KEYWORDS.iter().copied().find(|kw| {
        upper[i..].starts_with(kw.as_bytes())
            && upper
                .get(i + kw.len())
                .map_or(true, |b| !is_ident_byte(*b))
    })
}

/// Clause keyword and body for each clause outside parentheses
fn top_level_clauses(normalized: &str) -> Vec<(&'static str, String)> {
    let upper = normalized.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let mut marks: Vec<(usize, &'static str)> = Vec::new();
    let mut depth = 0i32;
    let mut in_backtick = false;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'`' => in_backtick = !in_backtick,
            b'(' if !in_backtick => depth += 1,
            b')' if !in_backtick => depth -= 1,
            _ if depth == 0 && !in_backtick => {
                if let Some(kw) = keyword_at(bytes, i) {
                    marks.push((i, kw));
                    i += kw.len();
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    marks
        .iter()
        .enumerate()
        .map(|(n, (start, kw))| {
            let end = marks.get(n + 1).map_or(normalized.len(), |next| next.0);
            (*kw, normalized[start + kw.len()..end].trim().to_string())
        })
        .collect()
}

fn strip_leading_keyword<'a>(body: &'a str, keyword: &str) -> &'a str {
    let trimmed = body.trim_start();
    match trimmed.get(..keyword.len()) {
        Some(head)
            if head.eq_ignore_ascii_case(keyword)
                && trimmed[keyword.len()..].starts_with(' ') =>
        {
            &trimmed[keyword.len()..]
        }
        _ => body,
    }
}

/// Split on commas outside parentheses
pub fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut paren_depth = 0;

    for c in list.chars() {
        match c {
            '(' => {
                paren_depth += 1;
                current.push(c);
            }
            ')' => {
                paren_depth -= 1;
                current.push(c);
            }
            ',' if paren_depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }

    parts.retain(|p| !p.is_empty());
    parts
}

fn parse_from_clause(body: &str) -> (Option<TableMention>, Vec<JoinClause>) {
    let mut segments = JOIN_SPLIT_RE.split(body);

    let from = segments
        .next()
        .and_then(|first| PRIMARY_SEGMENT_RE.captures(first))
        .map(|cap| TableMention::new(&cap[1], cap.get(2).map(|m| m.as_str())));

    let joins = segments
        .filter(|segment| !segment.trim().is_empty())
        .map(|segment| match JOIN_SEGMENT_RE.captures(segment) {
            Some(cap) => JoinClause {
                target: TableMention::new(&cap[1], cap.get(2).map(|m| m.as_str())),
                equalities: EQUALITY_RE
                    .captures_iter(&cap[3])
                    .map(|eq| (ColumnRef::parse(&eq[1]), ColumnRef::parse(&eq[2])))
                    .collect(),
            },
            None => {
                let target = PRIMARY_SEGMENT_RE
                    .captures(segment)
                    .map(|cap| TableMention::new(&cap[1], cap.get(2).map(|m| m.as_str())))
                    .unwrap_or_else(|| TableMention::new(segment, None));
                JoinClause {
                    target,
                    equalities: Vec::new(),
                }
            }
        })
        .collect();

    (from, joins)
}

pub fn is_aggregate(expression: &str) -> bool {
    AGGREGATE_RE.is_match(expression)
}

/// Column references in an expression. Placeholders, literals, function
/// names and reserved words are skipped.
pub fn column_refs(expression: &str) -> Vec<ColumnRef> {
    let cleaned = PARAM_RE.replace_all(expression, " ");
    let cleaned = BACKTICK_RE.replace_all(&cleaned, " ");
    let cleaned = QUALIFIED_STAR_RE.replace_all(&cleaned, " ");
    let cleaned = NUMBER_RE.replace_all(&cleaned, " ");

    IDENT_RE
        .captures_iter(&cleaned)
        .filter(|cap| cap.get(2).is_none())
        .map(|cap| cap[1].to_string())
        .filter(|ident| ident.contains('.') || !is_reserved(ident))
        .map(|ident| ColumnRef::parse(&ident))
        .collect()
}

/// Comparable form of an expression: no whitespace, no qualifiers, uppercase
pub fn canonical_expression(expression: &str) -> String {
    static QUALIFIER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b[A-Za-z_]\w*\.").unwrap());

    let unqualified = QUALIFIER_RE.replace_all(expression, "");
    unqualified
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}
