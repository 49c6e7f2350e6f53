//! Named time windows
//!
//! Each pattern turns a reference instant into an inclusive `(start, end)`
//! date pair. Patterns are tried in declaration order, so more specific
//! phrases come first.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

pub type DateRange = (NaiveDate, NaiveDate);

#[derive(Clone, Copy)]
pub struct TimePattern {
    pub name: &'static str,
    pub phrases: &'static [&'static str],
    resolve: fn(NaiveDate) -> DateRange,
}

impl std::fmt::Debug for TimePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimePattern")
            .field("name", &self.name)
            .field("phrases", &self.phrases)
            .finish()
    }
}

impl TimePattern {
    pub fn resolve(&self, now: DateTime<Utc>) -> DateRange {
        (self.resolve)(now.date_naive())
    }

    /// `text` must already be lowercase.
    pub fn matches(&self, text: &str) -> bool {
        self.phrases.iter().any(|phrase| contains_phrase(text, phrase))
    }
}

/// Substring match that refuses to split words ("mtd" does not match "mtdx").
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';

    text.match_indices(phrase).any(|(start, _)| {
        let before_ok = text[..start].chars().next_back().map_or(true, |c| !is_word(c));
        let after_ok = text[start + phrase.len()..]
            .chars()
            .next()
            .map_or(true, |c| !is_word(c));
        before_ok && after_ok
    })
}

pub fn builtin_time_patterns() -> Vec<TimePattern> {
    vec![
        TimePattern {
            name: "yesterday",
            phrases: &["yesterday"],
            resolve: |d| (d - Duration::days(1), d - Duration::days(1)),
        },
        TimePattern {
            name: "today",
            phrases: &["today"],
            resolve: |d| (d, d),
        },
        TimePattern {
            name: "last_7_days",
            phrases: &["last 7 days", "past 7 days", "last seven days", "past seven days"],
            resolve: |d| (d - Duration::days(7), d),
        },
        TimePattern {
            name: "last_30_days",
            phrases: &["last 30 days", "past 30 days", "last thirty days"],
            resolve: |d| (d - Duration::days(30), d),
        },
        TimePattern {
            name: "last_90_days",
            phrases: &["last 90 days", "past 90 days", "last ninety days"],
            resolve: |d| (d - Duration::days(90), d),
        },
        TimePattern {
            name: "last_week",
            phrases: &["last week", "previous week"],
            resolve: |d| {
                let start = week_start(d) - Duration::days(7);
                (start, start + Duration::days(6))
            },
        },
        TimePattern {
            name: "this_week",
            phrases: &["this week", "week to date"],
            resolve: |d| (week_start(d), d),
        },
        TimePattern {
            name: "last_month",
            phrases: &["last month", "previous month"],
            resolve: |d| {
                let end = month_start(d) - Duration::days(1);
                (month_start(end), end)
            },
        },
        TimePattern {
            name: "this_month",
            phrases: &["this month", "month to date", "mtd"],
            resolve: |d| (month_start(d), d),
        },
        TimePattern {
            name: "last_quarter",
            phrases: &["last quarter", "previous quarter"],
            resolve: |d| {
                let end = quarter_start(d) - Duration::days(1);
                (quarter_start(end), end)
            },
        },
        TimePattern {
            name: "this_quarter",
            phrases: &["this quarter", "quarter to date", "qtd"],
            resolve: |d| (quarter_start(d), d),
        },
        TimePattern {
            name: "last_year",
            phrases: &["last year", "previous year"],
            resolve: |d| {
                let end = year_start(d) - Duration::days(1);
                (year_start(end), end)
            },
        },
        TimePattern {
            name: "this_year",
            phrases: &["this year"],
            resolve: |d| (year_start(d), d),
        },
        TimePattern {
            name: "year_to_date",
            phrases: &["year to date", "ytd"],
            resolve: |d| (year_start(d), d),
        },
    ]
}

fn week_start(d: NaiveDate) -> NaiveDate {
    d - Duration::days(i64::from(d.weekday().num_days_from_monday()))
}

fn month_start(d: NaiveDate) -> NaiveDate {
    d - Duration::days(i64::from(d.day0()))
}

fn quarter_start(d: NaiveDate) -> NaiveDate {
    let mut start = month_start(d);
    while start.month0() % 3 != 0 {
        start = month_start(start - Duration::days(1));
    }
    start
}

fn year_start(d: NaiveDate) -> NaiveDate {
    d - Duration::days(i64::from(d.ordinal0()))
}
