//! `SQLite` storage for mentions and saved rules.
//!
//! Keeps the table layout the scraper writes (`kwatch_alert_results`) and a
//! small `saved_rules` table. All filtered reads go through
//! [`SqlBuilder`](crate::query::SqlBuilder) so user input is only ever bound
//! as a parameter.

use crate::date_parser::format_timestamp;
use crate::model::{
    AuthorStat, CountByDay, DEFAULT_SENTIMENT, KeywordStat, MENTION_SOURCE, Mention,
    MentionRecord, Rule, RuleDraft, UNKNOWN_SENTIMENT,
};
use crate::query::{MentionFilter, Page, SqlBuilder};
use crate::{ExplorerError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

const SCHEMA_VERSION: i32 = 1;

/// Name of the scraped-mentions table.
pub const MENTIONS_TABLE: &str = "kwatch_alert_results";

const MENTION_COLUMNS: &str = "id, author, content, received_at, url, sentiment, keyword";

/// A JSON object produced from one result row.
pub type JsonRow = Map<String, JsonValue>;

/// Storage shared between request handlers.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// Run `f` against the shared store on the blocking thread pool.
///
/// # Errors
///
/// Returns whatever `f` returns, or [`ExplorerError::TaskFailed`] if the
/// blocking task panicked or was cancelled.
pub async fn with_storage<T, F>(storage: &SharedStorage, f: F) -> Result<T>
where
    F: FnOnce(&mut Storage) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let storage = Arc::clone(storage);
    tokio::task::spawn_blocking(move || {
        let mut guard = storage.lock();
        f(&mut guard)
    })
    .await
    .map_err(|e| ExplorerError::TaskFailed(e.to_string()))?
}

fn parse_stored_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&value) {
        return Some(dt.with_timezone(&Utc));
    }
    // CURRENT_TIMESTAMP default: "YYYY-MM-DD HH:MM:SS" in UTC.
    NaiveDateTime::parse_from_str(&value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// `SQLite` storage manager
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open or create the database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| ExplorerError::path_error("create directory", parent, e))?;
        }

        let conn = Connection::open(db_path)?;

        // Set pragmas for performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let storage = Self { conn };
        storage.migrate()?;
        info!(path = %db_path.display(), "Opened mention database");
        Ok(storage)
    }

    /// Wrap this store for sharing across async tasks.
    #[must_use]
    pub fn into_shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialized.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA temp_store = MEMORY;")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    /// Cheap liveness probe.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot run a trivial query.
    pub fn ping(&self) -> Result<()> {
        self.conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(&self) -> Result<()> {
        // Tables are bootstrapped on every open; the scraper may have
        // created the mentions table before we ever ran.
        self.create_schema()?;

        let current_version = self.get_schema_version();
        if current_version > SCHEMA_VERSION {
            return Err(ExplorerError::SchemaTooNew {
                expected: SCHEMA_VERSION,
                found: current_version,
            });
        }
        if current_version < SCHEMA_VERSION {
            info!(
                "Migrating database from version {} to {}",
                current_version, SCHEMA_VERSION
            );
            self.set_schema_version(SCHEMA_VERSION)?;
        }

        Ok(())
    }

    fn get_schema_version(&self) -> i32 {
        let result: rusqlite::Result<i32> = self.conn.query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                let value: String = row.get(0)?;
                Ok(value.parse().unwrap_or(0))
            },
        );

        // Treat a missing row as version 0.
        result.unwrap_or_default()
    }

    fn set_schema_version(&self, version: i32) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('schema_version', ?)",
            params![version.to_string()],
        )?;
        Ok(())
    }

    fn create_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Scraped mentions, one row per matched post
            CREATE TABLE IF NOT EXISTS kwatch_alert_results (
                id INTEGER PRIMARY KEY,
                author TEXT,
                content TEXT,
                received_at TEXT,
                url TEXT,
                sentiment TEXT,
                keyword TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_mentions_keyword ON kwatch_alert_results(keyword);
            CREATE INDEX IF NOT EXISTS idx_mentions_received_at ON kwatch_alert_results(received_at);

            -- User-authored rules
            CREATE TABLE IF NOT EXISTS saved_rules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                instruction TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            ",
        )?;

        Ok(())
    }

    // =========================================================================
    // Mentions
    // =========================================================================

    /// Store mentions in a single transaction.
    ///
    /// Records carrying an `id` replace any existing row with that id.
    ///
    /// # Errors
    ///
    /// Returns an error if any insert fails; nothing is written in that case.
    pub fn insert_mentions(&mut self, records: &[MentionRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut count = 0;

        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO kwatch_alert_results
                 (id, author, content, received_at, url, sentiment, keyword)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;

            for record in records {
                count += stmt.execute(params![
                    record.id,
                    record.author,
                    record.content,
                    record.received_at.map(format_timestamp),
                    record.url,
                    record.sentiment,
                    record.keyword,
                ])?;
            }
        }

        tx.commit()?;
        debug!(count, "Inserted mentions");
        Ok(count)
    }

    /// Mention counts per keyword, most mentioned first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn keyword_counts(&self) -> Result<Vec<KeywordStat>> {
        let mut stmt = self.conn.prepare(
            r"
            SELECT keyword, COUNT(*) AS count
            FROM kwatch_alert_results
            WHERE keyword IS NOT NULL
            GROUP BY keyword
            ORDER BY count DESC, keyword ASC
            ",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(KeywordStat {
                keyword: row.get(0)?,
                count: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// A page of mentions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn mentions(&self, filter: &MentionFilter, page: Page) -> Result<Vec<Mention>> {
        let mut builder =
            SqlBuilder::select(&format!("SELECT {MENTION_COLUMNS} FROM {MENTIONS_TABLE}"));
        filter.apply(&mut builder);
        builder
            .push("ORDER BY received_at DESC, id DESC")
            .page(page);

        let mut stmt = self.conn.prepare(builder.sql())?;
        let rows = stmt.query_map(params_from_iter(builder.params()), mention_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of distinct authors matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn unique_author_count(&self, filter: &MentionFilter) -> Result<i64> {
        let mut builder = SqlBuilder::select(&format!(
            "SELECT COUNT(DISTINCT author) FROM {MENTIONS_TABLE}"
        ));
        filter.apply(&mut builder);

        Ok(self.conn.query_row(
            builder.sql(),
            params_from_iter(builder.params()),
            |row| row.get(0),
        )?)
    }

    /// Most prolific authors matching the filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn top_authors(&self, filter: &MentionFilter, limit: u32) -> Result<Vec<AuthorStat>> {
        let mut builder = SqlBuilder::select(&format!(
            "SELECT author, COUNT(*) AS count FROM {MENTIONS_TABLE}"
        ));
        builder.and_literal("author IS NOT NULL");
        filter.apply(&mut builder);
        builder
            .push("GROUP BY author ORDER BY count DESC, author ASC")
            .limit(limit);

        let mut stmt = self.conn.prepare(builder.sql())?;
        let rows = stmt.query_map(params_from_iter(builder.params()), |row| {
            Ok(AuthorStat {
                author: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Mention counts per calendar day (UTC), oldest first.
    ///
    /// With `split_sentiment`, each day has one row per sentiment bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts_by_day(
        &self,
        filter: &MentionFilter,
        split_sentiment: bool,
    ) -> Result<Vec<CountByDay>> {
        let base = if split_sentiment {
            format!(
                "SELECT DATE(received_at) AS day, COALESCE(sentiment, '{UNKNOWN_SENTIMENT}') AS bucket, \
                 COUNT(*) AS count FROM {MENTIONS_TABLE}"
            )
        } else {
            format!(
                "SELECT DATE(received_at) AS day, NULL AS bucket, COUNT(*) AS count FROM {MENTIONS_TABLE}"
            )
        };

        let mut builder = SqlBuilder::select(&base);
        builder.and_literal("received_at IS NOT NULL");
        filter.apply(&mut builder);
        if split_sentiment {
            builder.push("GROUP BY day, bucket ORDER BY day ASC, bucket ASC");
        } else {
            builder.push("GROUP BY day ORDER BY day ASC");
        }

        let mut stmt = self.conn.prepare(builder.sql())?;
        let rows = stmt.query_map(params_from_iter(builder.params()), |row| {
            let day: Option<String> = row.get(0)?;
            let sentiment: Option<String> = row.get(1)?;
            let count: i64 = row.get(2)?;
            Ok((day, sentiment, count))
        })?;

        let mut counts = Vec::new();
        for row in rows {
            let (day, sentiment, count) = row?;
            // DATE() yields NULL for text it cannot read as a timestamp.
            if let Some(date) = day {
                counts.push(CountByDay {
                    date,
                    count,
                    sentiment,
                });
            }
        }
        Ok(counts)
    }

    /// Mention counts per raw sentiment value (NULL kept as `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn sentiment_counts(&self, filter: &MentionFilter) -> Result<Vec<(Option<String>, i64)>> {
        let mut builder = SqlBuilder::select(&format!(
            "SELECT sentiment, COUNT(*) AS count FROM {MENTIONS_TABLE}"
        ));
        filter.apply(&mut builder);
        builder.push("GROUP BY sentiment ORDER BY count DESC");

        let mut stmt = self.conn.prepare(builder.sql())?;
        let rows = stmt.query_map(params_from_iter(builder.params()), |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    // =========================================================================
    // Rules
    // =========================================================================

    /// All saved rules in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_rules(&self) -> Result<Vec<Rule>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, instruction, created_at FROM saved_rules ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([], rule_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Fetch one rule.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_rule(&self, id: i64) -> Result<Option<Rule>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id, title, instruction, created_at FROM saved_rules WHERE id = ?",
                params![id],
                rule_from_row,
            )
            .optional()?)
    }

    /// Insert a new rule and return it as stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_rule(&self, draft: &RuleDraft) -> Result<Rule> {
        let rule = self.conn.query_row(
            "INSERT INTO saved_rules (title, instruction) VALUES (?, ?)
             RETURNING id, title, instruction, created_at",
            params![draft.title, draft.instruction],
            rule_from_row,
        )?;
        debug!(id = rule.id, "Created rule");
        Ok(rule)
    }

    /// Overwrite a rule's title and instruction.
    ///
    /// Returns `None` when no rule has that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_rule(&self, id: i64, draft: &RuleDraft) -> Result<Option<Rule>> {
        Ok(self
            .conn
            .query_row(
                "UPDATE saved_rules SET title = ?, instruction = ? WHERE id = ?
                 RETURNING id, title, instruction, created_at",
                params![draft.title, draft.instruction, id],
                rule_from_row,
            )
            .optional()?)
    }

    /// Delete a rule. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_rule(&self, id: i64) -> Result<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM saved_rules WHERE id = ?", params![id])?;
        Ok(changed > 0)
    }

    // =========================================================================
    // Generated SQL
    // =========================================================================

    /// Execute a statement exactly as given and return its rows as JSON
    /// objects keyed by column name.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::GeneratedSql`] if the statement fails to
    /// prepare or run.
    pub fn run_query(&self, sql: &str) -> Result<Vec<JsonRow>> {
        let failed = |e: rusqlite::Error| ExplorerError::GeneratedSql {
            sql: sql.to_string(),
            reason: e.to_string(),
        };

        let mut stmt = self.conn.prepare(sql).map_err(failed)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(String::from)
            .collect();

        let mut rows = stmt.query([]).map_err(failed)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(failed)? {
            let mut object = Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row.get_ref(idx).map_err(failed)?;
                object.insert(name.clone(), json_from_sql(value));
            }
            out.push(object);
        }

        debug!(rows = out.len(), "Generated SQL executed");
        Ok(out)
    }
}

fn mention_from_row(row: &Row<'_>) -> rusqlite::Result<Mention> {
    let sentiment: Option<String> = row.get(5)?;
    Ok(Mention {
        id: row.get(0)?,
        author: row.get(1)?,
        content: row.get(2)?,
        date: row.get(3)?,
        url: row.get(4)?,
        sentiment: sentiment.unwrap_or_else(|| DEFAULT_SENTIMENT.to_string()),
        keyword: row.get(6)?,
        source: MENTION_SOURCE.to_string(),
    })
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<Rule> {
    Ok(Rule {
        id: row.get(0)?,
        title: row.get(1)?,
        instruction: row.get(2)?,
        created_at: parse_stored_timestamp(row.get(3)?),
    })
}

fn json_from_sql(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Integer(i) => JsonValue::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(JsonValue::Null, JsonValue::Number),
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            JsonValue::String(bytes.iter().map(|b| format!("{b:02x}")).collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::KeywordSelection;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
    }

    fn record(
        author: &str,
        keyword: &str,
        received_at: DateTime<Utc>,
        sentiment: Option<&str>,
    ) -> MentionRecord {
        MentionRecord {
            id: None,
            author: Some(author.to_string()),
            content: Some(format!("{author} on {keyword}")),
            received_at: Some(received_at),
            url: Some(format!("https://reddit.com/r/test/{author}")),
            sentiment: sentiment.map(str::to_string),
            keyword: Some(keyword.to_string()),
        }
    }

    fn seeded() -> Storage {
        let mut storage = Storage::open_memory().unwrap();
        storage
            .insert_mentions(&[
                record("alice", "Ozempic", at(2023, 1, 1, 9), Some("positive")),
                record("bob", "Ozempic", at(2023, 1, 1, 15), Some("negative")),
                record("alice", "Ozempic", at(2023, 1, 2, 10), None),
                record("carol", "Wegovy", at(2023, 1, 3, 8), Some("positive")),
                record("dave", "Wegovy", at(2023, 1, 5, 12), Some("neutral")),
            ])
            .unwrap();
        storage
    }

    fn only(keyword: &str) -> MentionFilter {
        MentionFilter::keywords(KeywordSelection::parse(Some(keyword)))
    }

    #[test]
    fn test_create_database() {
        let storage = Storage::open_memory().unwrap();
        storage.ping().unwrap();
        assert!(storage.keyword_counts().unwrap().is_empty());
        assert_eq!(storage.get_schema_version(), SCHEMA_VERSION);
    }

    #[test]
    fn test_open_file_creates_parent_and_reopens() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("mentions.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage
                .create_rule(&RuleDraft {
                    title: "t".to_string(),
                    instruction: "i".to_string(),
                })
                .unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.list_rules().unwrap().len(), 1);
    }

    #[test]
    fn test_schema_too_new_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mentions.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.set_schema_version(SCHEMA_VERSION + 1).unwrap();
        }
        let err = Storage::open(&path).err().unwrap();
        assert!(matches!(err, ExplorerError::SchemaTooNew { .. }));
    }

    #[test]
    fn test_keyword_counts_ordered_by_count() {
        let storage = seeded();
        let counts = storage.keyword_counts().unwrap();
        assert_eq!(
            counts,
            vec![
                KeywordStat {
                    keyword: "Ozempic".to_string(),
                    count: 3
                },
                KeywordStat {
                    keyword: "Wegovy".to_string(),
                    count: 2
                },
            ]
        );
    }

    #[test]
    fn test_keyword_counts_skip_null_keyword() {
        let mut storage = seeded();
        storage
            .insert_mentions(&[MentionRecord {
                author: Some("eve".to_string()),
                ..MentionRecord::default()
            }])
            .unwrap();
        let total: i64 = storage.keyword_counts().unwrap().iter().map(|k| k.count).sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_mentions_newest_first_with_defaults() {
        let storage = seeded();
        let mentions = storage
            .mentions(&MentionFilter::default(), Page::default())
            .unwrap();
        assert_eq!(mentions.len(), 5);
        assert_eq!(mentions[0].author.as_deref(), Some("dave"));
        assert_eq!(mentions[0].date.as_deref(), Some("2023-01-05T12:00:00Z"));
        assert_eq!(mentions[0].source, "Reddit");

        let unsentimented = mentions
            .iter()
            .find(|m| m.date.as_deref() == Some("2023-01-02T10:00:00Z"))
            .unwrap();
        assert_eq!(unsentimented.sentiment, "neutral");
    }

    #[test]
    fn test_mentions_keyword_and_pagination() {
        let storage = seeded();
        let first = storage
            .mentions(&only("Ozempic"), Page { limit: 2, offset: 0 })
            .unwrap();
        let second = storage
            .mentions(&only("Ozempic"), Page { limit: 2, offset: 2 })
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 1);
        assert!(
            first
                .iter()
                .chain(second.iter())
                .all(|m| m.keyword.as_deref() == Some("Ozempic"))
        );
        assert_eq!(second[0].date.as_deref(), Some("2023-01-01T09:00:00Z"));
    }

    #[test]
    fn test_mentions_date_range_is_inclusive() {
        let storage = seeded();
        let filter =
            MentionFilter::default().with_range(Some(at(2023, 1, 1, 15)), Some(at(2023, 1, 3, 8)));
        let mentions = storage.mentions(&filter, Page::default()).unwrap();
        let authors: Vec<_> = mentions.iter().filter_map(|m| m.author.clone()).collect();
        assert_eq!(authors, vec!["carol", "alice", "bob"]);
    }

    #[test]
    fn test_mentions_multiple_keywords() {
        let storage = seeded();
        let filter = MentionFilter::keywords(KeywordSelection::parse(Some("Wegovy,Missing")));
        let mentions = storage.mentions(&filter, Page::default()).unwrap();
        assert_eq!(mentions.len(), 2);
    }

    #[test]
    fn test_unique_author_count() {
        let storage = seeded();
        assert_eq!(
            storage
                .unique_author_count(&MentionFilter::default())
                .unwrap(),
            4
        );
        assert_eq!(storage.unique_author_count(&only("Ozempic")).unwrap(), 2);
        assert_eq!(storage.unique_author_count(&only("Nothing")).unwrap(), 0);
    }

    #[test]
    fn test_top_authors_excludes_null_author() {
        let mut storage = seeded();
        storage
            .insert_mentions(&[MentionRecord {
                keyword: Some("Ozempic".to_string()),
                ..MentionRecord::default()
            }])
            .unwrap();

        let authors = storage.top_authors(&MentionFilter::default(), 2).unwrap();
        assert_eq!(
            authors,
            vec![
                AuthorStat {
                    author: "alice".to_string(),
                    count: 2
                },
                AuthorStat {
                    author: "bob".to_string(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn test_counts_by_day() {
        let storage = seeded();
        let days = storage
            .counts_by_day(&MentionFilter::default(), false)
            .unwrap();
        let flat: Vec<_> = days.iter().map(|d| (d.date.as_str(), d.count)).collect();
        assert_eq!(
            flat,
            vec![
                ("2023-01-01", 2),
                ("2023-01-02", 1),
                ("2023-01-03", 1),
                ("2023-01-05", 1)
            ]
        );
        assert!(days.iter().all(|d| d.sentiment.is_none()));
    }

    #[test]
    fn test_counts_by_day_split_sentiment() {
        let storage = seeded();
        let days = storage.counts_by_day(&only("Ozempic"), true).unwrap();
        let flat: Vec<_> = days
            .iter()
            .map(|d| (d.date.as_str(), d.sentiment.as_deref(), d.count))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("2023-01-01", Some("negative"), 1),
                ("2023-01-01", Some("positive"), 1),
                ("2023-01-02", Some("unknown"), 1),
            ]
        );
    }

    #[test]
    fn test_sentiment_counts_keep_null() {
        let storage = seeded();
        let counts = storage.sentiment_counts(&only("Ozempic")).unwrap();
        assert_eq!(counts.len(), 3);
        assert!(counts.contains(&(None, 1)));
        assert!(counts.contains(&(Some("positive".to_string()), 1)));
    }

    #[test]
    fn test_insert_with_id_replaces() {
        let mut storage = Storage::open_memory().unwrap();
        let mut first = record("alice", "Ozempic", at(2023, 1, 1, 9), Some("positive"));
        first.id = Some(7);
        storage.insert_mentions(&[first.clone()]).unwrap();

        first.sentiment = Some("negative".to_string());
        storage.insert_mentions(&[first]).unwrap();

        let mentions = storage
            .mentions(&MentionFilter::default(), Page::default())
            .unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].id, 7);
        assert_eq!(mentions[0].sentiment, "negative");
    }

    #[test]
    fn test_rule_crud() {
        let storage = Storage::open_memory().unwrap();
        let created = storage
            .create_rule(&RuleDraft {
                title: "Side effects".to_string(),
                instruction: "Summarize reported side effects".to_string(),
            })
            .unwrap();
        assert_eq!(created.title, "Side effects");
        assert!(created.created_at.is_some());

        let updated = storage
            .update_rule(
                created.id,
                &RuleDraft {
                    title: "Side effects v2".to_string(),
                    instruction: "SQL: count negative posts".to_string(),
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.instruction, "SQL: count negative posts");
        assert_eq!(updated.created_at, created.created_at);

        assert_eq!(storage.get_rule(created.id).unwrap(), Some(updated));
        assert!(storage.delete_rule(created.id).unwrap());
        assert!(!storage.delete_rule(created.id).unwrap());
        assert!(storage.get_rule(created.id).unwrap().is_none());
    }

    #[test]
    fn test_update_missing_rule_returns_none() {
        let storage = Storage::open_memory().unwrap();
        let draft = RuleDraft {
            title: "x".to_string(),
            instruction: "y".to_string(),
        };
        assert!(storage.update_rule(99, &draft).unwrap().is_none());
    }

    #[test]
    fn test_list_rules_in_id_order() {
        let storage = Storage::open_memory().unwrap();
        for title in ["first", "second", "third"] {
            storage
                .create_rule(&RuleDraft {
                    title: title.to_string(),
                    instruction: "do it".to_string(),
                })
                .unwrap();
        }
        let titles: Vec<_> = storage
            .list_rules()
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(titles, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_run_query_maps_column_types() {
        let storage = seeded();
        let rows = storage
            .run_query(
                "SELECT keyword, COUNT(*) AS n, 0.5 AS ratio, NULL AS nothing, x'beef' AS raw \
                 FROM kwatch_alert_results GROUP BY keyword ORDER BY keyword",
            )
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["keyword"], "Ozempic");
        assert_eq!(rows[0]["n"], 3);
        assert_eq!(rows[0]["ratio"], 0.5);
        assert!(rows[0]["nothing"].is_null());
        assert_eq!(rows[0]["raw"], "beef");
    }

    #[test]
    fn test_run_query_reports_generated_sql_error() {
        let storage = seeded();
        let err = storage.run_query("SELEKT nonsense").unwrap_err();
        match err {
            ExplorerError::GeneratedSql { sql, .. } => assert_eq!(sql, "SELEKT nonsense"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_stored_timestamp_formats() {
        assert_eq!(
            parse_stored_timestamp(Some("2024-05-01 10:11:12".to_string())),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 11, 12).single().unwrap())
        );
        assert_eq!(
            parse_stored_timestamp(Some("2024-05-01T10:11:12Z".to_string())),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 11, 12).single().unwrap())
        );
        assert_eq!(parse_stored_timestamp(Some("garbage".to_string())), None);
        assert_eq!(parse_stored_timestamp(None), None);
    }
}
