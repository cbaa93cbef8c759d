//! Integration tests for mention-explorer.
//!
//! These tests verify end-to-end functionality including:
//! - Mention import into an on-disk database
//! - Filtered queries and aggregates over imported data
//! - Saved rules surviving a reopen

use chrono::{TimeZone, Utc};
use mention_explorer::{
    Storage, analytics, importer,
    model::RuleDraft,
    query::{KeywordSelection, MentionFilter, Page},
};
use std::path::PathBuf;
use tempfile::TempDir;

const MENTIONS: &str = r#"
{"id": 101, "author": "pharma_watch", "content": "Ozempic supply is back", "date": "2023-03-01T09:00:00Z", "keyword": "Ozempic", "sentiment": "positive"}
{"id": 102, "author": "glp1fan", "content": "Day 3 on Ozempic, mild nausea", "date": "2023-03-01T18:45:00Z", "keyword": "Ozempic", "sentiment": "negative"}
{"id": 103, "author": "pharma_watch", "content": "Wegovy pricing thread", "date": "2023-03-02T07:10:00Z", "keyword": "Wegovy"}
{"id": 104, "author": "", "content": "anonymous Mounjaro post", "date": "2023-03-05", "keyword": "Mounjaro", "sentiment": "NEUTRAL"}
{"id": 105, "author": "glp1fan", "content": "no date on this one", "keyword": "Ozempic"}
"#;

/// Write the sample file and import it into a fresh on-disk database.
fn imported_db(dir: &TempDir) -> PathBuf {
    let input = dir.path().join("mentions.jsonl");
    std::fs::write(&input, MENTIONS).unwrap();
    let db_path = dir.path().join("data").join("mentions.db");

    let records = importer::read_mentions(&input).unwrap();
    let mut storage = Storage::open(&db_path).unwrap();
    assert_eq!(storage.insert_mentions(&records).unwrap(), 5);
    db_path
}

fn only(keyword: &str) -> MentionFilter {
    MentionFilter::keywords(KeywordSelection::parse(Some(keyword)))
}

#[test]
fn test_import_then_reopen_and_query() {
    let dir = TempDir::new().unwrap();
    let db_path = imported_db(&dir);

    let storage = Storage::open(&db_path).unwrap();
    let overview = analytics::keyword_overview(&storage).unwrap();
    assert_eq!(overview[0].keyword, "All");
    assert_eq!(overview[0].count, 5);
    assert_eq!(overview[1].keyword, "Ozempic");
    assert_eq!(overview[1].count, 3);

    let mentions = storage
        .mentions(&MentionFilter::default(), Page::clamped(50, 0, 1000))
        .unwrap();
    assert_eq!(mentions.len(), 5);
    assert_eq!(mentions[0].id, 104);
    assert_eq!(mentions[0].date.as_deref(), Some("2023-03-05T00:00:00Z"));
    assert_eq!(mentions[0].sentiment, "neutral");
    assert!(mentions[0].author.is_none());
    // Undated rows sort after dated ones.
    assert_eq!(mentions[4].id, 105);
    assert_eq!(mentions[4].sentiment, "neutral");
}

#[test]
fn test_filtered_aggregates() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(imported_db(&dir)).unwrap();

    let ozempic = only("Ozempic");
    assert_eq!(storage.unique_author_count(&ozempic).unwrap(), 2);

    let authors = storage.top_authors(&MentionFilter::default(), 10).unwrap();
    let names: Vec<&str> = authors.iter().map(|a| a.author.as_str()).collect();
    assert_eq!(names, vec!["glp1fan", "pharma_watch"]);

    let march_first = MentionFilter::default().with_range(
        Utc.with_ymd_and_hms(2023, 3, 1, 0, 0, 0).single(),
        Utc.with_ymd_and_hms(2023, 3, 1, 23, 59, 59).single(),
    );
    let days = storage.counts_by_day(&march_first, false).unwrap();
    assert_eq!(days.len(), 1);
    assert_eq!(days[0].date, "2023-03-01");
    assert_eq!(days[0].count, 2);

    let sentiment = analytics::sentiment_breakdown(&storage, &ozempic).unwrap();
    assert_eq!(sentiment.get("positive"), Some(&1));
    assert_eq!(sentiment.get("negative"), Some(&1));
    assert_eq!(sentiment.get("unknown"), Some(&1));
}

#[test]
fn test_rules_persist_across_reopen() {
    let dir = TempDir::new().unwrap();
    let db_path = imported_db(&dir);

    let created = {
        let storage = Storage::open(&db_path).unwrap();
        storage
            .create_rule(&RuleDraft {
                title: "Side effects".to_string(),
                instruction: "FILTER: posts describing side effects".to_string(),
            })
            .unwrap()
    };
    assert!(created.created_at.is_some());

    let storage = Storage::open(&db_path).unwrap();
    let rules = storage.list_rules().unwrap();
    assert_eq!(rules, vec![created.clone()]);

    assert!(storage.delete_rule(created.id).unwrap());
    assert!(storage.get_rule(created.id).unwrap().is_none());
}

#[test]
fn test_generated_query_sees_imported_rows() {
    let dir = TempDir::new().unwrap();
    let storage = Storage::open(imported_db(&dir)).unwrap();

    let rows = storage
        .run_query(
            "SELECT author, COUNT(*) AS posts FROM kwatch_alert_results \
             WHERE author IS NOT NULL GROUP BY author ORDER BY author",
        )
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["author"], "glp1fan");
    assert_eq!(rows[0]["posts"], 2);
}
