//! Mention import from JSON files.
//!
//! Accepts either a JSON array of objects or JSON Lines (one object per
//! line). Field names follow the mentions table; `date` is accepted as an
//! alias for `received_at`.

use crate::date_parser::parse_date_flexible;
use crate::model::MentionRecord;
use crate::{ExplorerError, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// One input object before normalization.
#[derive(Debug, Default, Deserialize)]
struct RawMention {
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "date")]
    received_at: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    keyword: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl RawMention {
    fn normalize(self, position: usize) -> Result<MentionRecord> {
        let received_at = match non_blank(self.received_at) {
            Some(raw) => Some(parse_date_flexible(&raw, false).map_err(|_| {
                ExplorerError::invalid_argument(format!(
                    "record {position}: unrecognized date '{raw}'"
                ))
            })?),
            None => None,
        };

        Ok(MentionRecord {
            id: self.id,
            author: non_blank(self.author),
            content: self.content,
            received_at,
            url: non_blank(self.url),
            sentiment: non_blank(self.sentiment).map(|s| s.to_lowercase()),
            keyword: non_blank(self.keyword),
        })
    }
}

/// Parse mentions from file contents.
///
/// # Errors
///
/// Returns an error naming the offending record if the input is not valid
/// JSON or a date cannot be understood.
pub fn parse_mentions(input: &str) -> Result<Vec<MentionRecord>> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        let raw: Vec<RawMention> = serde_json::from_str(trimmed).map_err(|e| {
            ExplorerError::invalid_argument(format!("invalid JSON array: {e}"))
        })?;
        return raw
            .into_iter()
            .enumerate()
            .map(|(idx, r)| r.normalize(idx + 1))
            .collect();
    }

    let mut records = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let raw: RawMention = serde_json::from_str(line).map_err(|e| {
            ExplorerError::invalid_argument(format!("line {}: {e}", idx + 1))
        })?;
        records.push(raw.normalize(idx + 1)?);
    }
    debug!(count = records.len(), "Parsed JSON Lines input");
    Ok(records)
}

/// Read and parse a mentions file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_mentions(path: &Path) -> Result<Vec<MentionRecord>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ExplorerError::path_error("read", path, e))?;
    let records = parse_mentions(&content)?;
    info!(path = %path.display(), count = records.len(), "Read mentions file");
    Ok(records)
}
