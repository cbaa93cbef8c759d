//! Response shaping on top of the raw storage aggregates.

use crate::model::{KeywordStat, Mention, UNKNOWN_SENTIMENT};
use crate::query::MentionFilter;
use crate::storage::Storage;
use crate::{ALL_KEYWORD, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of `GET /api/mentions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionsPage {
    pub mentions: Vec<Mention>,
}

/// Keyword counts with a leading `All` row holding the total.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
pub fn keyword_overview(storage: &Storage) -> Result<Vec<KeywordStat>> {
    let counts = storage.keyword_counts()?;
    Ok(with_total(counts))
}

fn with_total(counts: Vec<KeywordStat>) -> Vec<KeywordStat> {
    let total = counts.iter().map(|k| k.count).sum();
    let mut overview = Vec::with_capacity(counts.len() + 1);
    overview.push(KeywordStat {
        keyword: ALL_KEYWORD.to_string(),
        count: total,
    });
    overview.extend(counts);
    overview
}

/// Mention counts keyed by sentiment label.
///
/// Mentions without a sentiment are counted under `"unknown"`.
///
/// # Errors
///
/// Returns an error if the underlying query fails.
pub fn sentiment_breakdown(
    storage: &Storage,
    filter: &MentionFilter,
) -> Result<BTreeMap<String, i64>> {
    let mut breakdown = BTreeMap::new();
    for (sentiment, count) in storage.sentiment_counts(filter)? {
        let label = sentiment.unwrap_or_else(|| UNKNOWN_SENTIMENT.to_string());
        *breakdown.entry(label).or_insert(0) += count;
    }
    Ok(breakdown)
}
