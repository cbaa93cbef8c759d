//! mention-explorer - Browse, chart, and query scraped keyword mentions
//!
//! This library serves a read-mostly JSON API over a table of social posts
//! matched against monitored keywords, plus a small store of
//! natural-language rules that a language model turns into SQL, filters,
//! or free-form analysis.
//!
//! Requests flow [`server`] -> [`handlers`] -> [`storage`], with filters
//! built by [`query`] and date bounds parsed by [`date_parser`]. Rule
//! execution lives in [`rules`] and talks to the model through [`llm`].
//! [`importer`] loads scraper exports for local use.

pub mod analytics;
pub mod cli;
pub mod config;
pub mod date_parser;
pub mod error;
pub mod handlers;
pub mod importer;
pub mod llm;
pub mod logging;
pub mod model;
pub mod query;
pub mod rules;
pub mod server;
pub mod storage;

pub use cli::*;
pub use error::{ExplorerError, Result, format_error};
pub use model::*;
pub use storage::Storage;

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// File name of the database inside the data directory.
pub const DEFAULT_DB_NAME: &str = "mentions.db";

/// Pseudo-keyword that means "no keyword filter".
pub const ALL_KEYWORD: &str = "All";

/// Page size used when a request does not give one.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Widest divider or truncated line printed by the CLI.
pub const CONTENT_DIVIDER_WIDTH: usize = 60;

/// Per-user data directory, falling back to the working directory.
#[must_use]
pub fn default_data_dir() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("mention-explorer")
}

/// Database used when neither `--db`, `MX_DB` nor the config file name one.
#[must_use]
pub fn default_db_path() -> PathBuf {
    default_data_dir().join(DEFAULT_DB_NAME)
}

/// Render a count with thousands separators (`12,345`).
#[must_use]
pub fn format_count(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if value < 0 {
        out.push('-');
    }
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render a stored timestamp for tables, or `-` when absent.
#[must_use]
pub fn format_created_at(value: Option<DateTime<Utc>>) -> String {
    value.map_or_else(|| "-".to_string(), |dt| dt.format("%Y-%m-%d %H:%M").to_string())
}

/// Shorten text to at most `max_chars` characters, marking the cut.
#[must_use]
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    let single_line = text.replace(['\n', '\r'], " ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let kept: String = single_line
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect();
    format!("{kept}...")
}
