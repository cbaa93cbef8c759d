//! Data models for mentions, statistics, and rules.
//!
//! These structures are the JSON shapes served by the API and the rows
//! read from the `kwatch_alert_results` and `saved_rules` tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source label reported for every mention.
pub const MENTION_SOURCE: &str = "Reddit";

/// Sentiment reported when a mention has none recorded.
pub const DEFAULT_SENTIMENT: &str = "neutral";

/// Sentiment bucket used in aggregates for mentions with no sentiment.
pub const UNKNOWN_SENTIMENT: &str = "unknown";

/// A scraped post that matched a monitored keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: i64,
    pub author: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub url: Option<String>,
    pub sentiment: String,
    pub keyword: Option<String>,
    pub source: String,
}

/// A mention row ready to be written to storage.
///
/// Every field is optional because the scraper writes sparse rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionRecord {
    pub id: Option<i64>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub url: Option<String>,
    pub sentiment: Option<String>,
    pub keyword: Option<String>,
}

/// Mention count for one keyword.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordStat {
    pub keyword: String,
    pub count: i64,
}

/// Mention count for one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStat {
    pub author: String,
    pub count: i64,
}

/// Mention count for one calendar day (optionally split by sentiment).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountByDay {
    pub date: String,
    pub count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
}

/// Number of distinct authors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueAuthors {
    pub count: i64,
}

/// A persisted natural-language rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: i64,
    pub title: String,
    pub instruction: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fields a client supplies when creating or updating a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDraft {
    pub title: String,
    pub instruction: String,
}

impl RuleDraft {
    /// Reject drafts with blank fields.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first blank field.
    pub fn validate(&self) -> crate::Result<()> {
        if self.title.trim().is_empty() {
            return Err(crate::ExplorerError::validation(
                "title",
                "must not be empty",
            ));
        }
        if self.instruction.trim().is_empty() {
            return Err(crate::ExplorerError::validation(
                "instruction",
                "must not be empty",
            ));
        }
        Ok(())
    }
}
