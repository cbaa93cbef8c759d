//! Filter types and parameterized SQL construction.
//!
//! Every read endpoint is the same shape: a base `SELECT ... WHERE 1=1`,
//! optional `AND` clauses for keywords and the date range, and a tail.
//! Values are always bound as parameters.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::ALL_KEYWORD;
use crate::date_parser::format_timestamp;

/// Which keywords a query is restricted to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeywordSelection {
    /// No keyword restriction.
    #[default]
    All,
    /// Only mentions tagged with one of these keywords.
    Only(Vec<String>),
}

impl KeywordSelection {
    /// Parse a `keyword` query value.
    ///
    /// Accepts a single keyword or a comma-separated list. `All` anywhere in
    /// the list (any case), or an empty value, selects everything.
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::All;
        };
        Self::from_list(raw.split(','))
    }

    /// Build a selection from already-split keywords.
    #[must_use]
    pub fn from_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut keywords: Vec<String> = Vec::new();
        for item in items {
            let keyword = item.as_ref().trim();
            if keyword.is_empty() {
                continue;
            }
            if keyword.eq_ignore_ascii_case(ALL_KEYWORD) {
                return Self::All;
            }
            if !keywords.iter().any(|k| k == keyword) {
                keywords.push(keyword.to_string());
            }
        }

        if keywords.is_empty() {
            Self::All
        } else {
            Self::Only(keywords)
        }
    }
}

/// Optional filters shared by the mention and statistics queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MentionFilter {
    pub keywords: KeywordSelection,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl MentionFilter {
    /// Filter on keywords only.
    #[must_use]
    pub const fn keywords(keywords: KeywordSelection) -> Self {
        Self {
            keywords,
            start: None,
            end: None,
        }
    }

    /// Restrict to a date range (either bound optional).
    #[must_use]
    pub const fn with_range(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// Append this filter's clauses to a builder.
    pub fn apply(&self, builder: &mut SqlBuilder) {
        match &self.keywords {
            KeywordSelection::All => {}
            KeywordSelection::Only(keywords) if keywords.len() == 1 => {
                builder.and("keyword = ?", [Value::Text(keywords[0].clone())]);
            }
            KeywordSelection::Only(keywords) => {
                let placeholders = vec!["?"; keywords.len()].join(", ");
                builder.and(
                    &format!("keyword IN ({placeholders})"),
                    keywords.iter().cloned().map(Value::Text),
                );
            }
        }

        if let Some(start) = self.start {
            builder.and("received_at >= ?", [Value::Text(format_timestamp(start))]);
        }
        if let Some(end) = self.end {
            builder.and("received_at <= ?", [Value::Text(format_timestamp(end))]);
        }
    }

    /// One-line human description, used in prompts and logs.
    #[must_use]
    pub fn describe(&self) -> String {
        let keywords = match &self.keywords {
            KeywordSelection::All => "all keywords".to_string(),
            KeywordSelection::Only(list) => format!("keyword in [{}]", list.join(", ")),
        };
        let start = self
            .start
            .map_or_else(|| "beginning".to_string(), format_timestamp);
        let end = self.end.map_or_else(|| "now".to_string(), format_timestamp);
        format!("{keywords}, received_at from {start} to {end}")
    }
}

/// Pagination window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// Create a page, clamping `limit` to `max_limit`.
    #[must_use]
    pub fn clamped(limit: u32, offset: u32, max_limit: u32) -> Self {
        Self {
            limit: limit.min(max_limit),
            offset,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: crate::DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

/// Accumulates a SQL statement and its positional parameters.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    sql: String,
    params: Vec<Value>,
}

impl SqlBuilder {
    /// Start from a base statement. A `WHERE 1=1` is appended so filters can
    /// always be added with `AND`.
    #[must_use]
    pub fn select(base: &str) -> Self {
        Self {
            sql: format!("{} WHERE 1=1", base.trim_end()),
            params: Vec::new(),
        }
    }

    /// Add an `AND` clause with its bound values.
    pub fn and<I>(&mut self, clause: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.sql.push_str(" AND ");
        self.sql.push_str(clause);
        self.params.extend(values);
        self
    }

    /// Add an `AND` clause that binds nothing.
    pub fn and_literal(&mut self, clause: &str) -> &mut Self {
        self.and(clause, std::iter::empty::<Value>())
    }

    /// Append a literal fragment (GROUP BY, ORDER BY, ...).
    pub fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push(' ');
        self.sql.push_str(fragment.trim());
        self
    }

    /// Append `LIMIT ? OFFSET ?`.
    pub fn page(&mut self, page: Page) -> &mut Self {
        self.sql.push_str(" LIMIT ? OFFSET ?");
        self.params.push(Value::Integer(i64::from(page.limit)));
        self.params.push(Value::Integer(i64::from(page.offset)));
        self
    }

    /// Append `LIMIT ?`.
    pub fn limit(&mut self, limit: u32) -> &mut Self {
        self.sql.push_str(" LIMIT ?");
        self.params.push(Value::Integer(i64::from(limit)));
        self
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}
