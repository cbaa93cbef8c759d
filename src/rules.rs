//! Saved-rule execution.
//!
//! A rule's instruction picks one of three modes by prefix:
//!
//! - `SQL:` / `QUERY:` - the model writes a query that is run against the
//!   mentions table
//! - `FILTER:` - the model picks matching mentions by id
//! - anything else - free-form analysis of the mentions
//!
//! The previous rule's output can be passed back in as `context` so rules
//! chain.

use crate::date_parser::parse_range;
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::logging::OperationGuard;
use crate::model::Mention;
use crate::query::{KeywordSelection, MentionFilter, Page};
use crate::storage::{SharedStorage, with_storage};
use crate::{ExplorerError, Result, truncate_text};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

/// Longest mention body included in a prompt.
const PROMPT_CONTENT_CHARS: usize = 600;

const SQL_SYSTEM_PROMPT: &str = "You translate analyst requests into a single SQLite query. \
The only table is kwatch_alert_results(id INTEGER PRIMARY KEY, author TEXT, content TEXT, \
received_at TEXT, url TEXT, sentiment TEXT, keyword TEXT). received_at is an RFC 3339 UTC \
timestamp such as 2024-01-31T18:05:00Z; use DATE(received_at) for calendar days. sentiment is \
'positive', 'negative', 'neutral' or NULL. Write one statement with no trailing commentary. \
Reply with a JSON object: {\"sql\": \"...\", \"explanation\": \"...\"}.";

const FILTER_SYSTEM_PROMPT: &str = "You select social media mentions that satisfy an analyst's \
criterion. You are given mentions as JSON lines. Reply with a JSON object: \
{\"ids\": [<id of every matching mention>], \"explanation\": \"...\"}. Use only ids from the input.";

const ANALYZE_SYSTEM_PROMPT: &str = "You analyse social media mentions for a brand analyst. \
You are given mentions as JSON lines. Reply with a JSON object: \
{\"explanation\": \"<short prose answer>\", \"data\": [<zero or more JSON objects with \
structured findings>]}.";

/// How a rule's instruction is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Sql,
    Filter,
    Analyze,
}

impl RuleMode {
    /// Pick the mode from the instruction prefix and return the remaining
    /// task text.
    #[must_use]
    pub fn detect(instruction: &str) -> (Self, &str) {
        let trimmed = instruction.trim();
        for (prefix, mode) in [
            ("SQL:", Self::Sql),
            ("QUERY:", Self::Sql),
            ("FILTER:", Self::Filter),
        ] {
            let matches = trimmed
                .get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
            if matches {
                return (mode, trimmed[prefix.len()..].trim_start());
            }
        }
        (Self::Analyze, trimmed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Filter => "filter",
            Self::Analyze => "analyze",
        }
    }
}

/// Keyword list given either as an array or a comma-separated string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeywordsParam {
    List(Vec<String>),
    Csv(String),
}

impl KeywordsParam {
    #[must_use]
    pub fn selection(&self) -> KeywordSelection {
        match self {
            Self::List(items) => KeywordSelection::from_list(items),
            Self::Csv(raw) => KeywordSelection::parse(Some(raw)),
        }
    }
}

/// Body of `POST /api/rules/execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleExecution {
    pub rule_id: i64,
    #[serde(default)]
    pub keywords: Option<KeywordsParam>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Output of a previous rule, passed to the model as-is.
    #[serde(default)]
    pub context: Option<JsonValue>,
}

impl RuleExecution {
    /// The mention filter this request selects.
    ///
    /// # Errors
    ///
    /// Returns an error if either date bound cannot be parsed.
    pub fn filter(&self) -> Result<MentionFilter> {
        let keywords = self
            .keywords
            .as_ref()
            .map(KeywordsParam::selection)
            .unwrap_or_default();
        let (start, end) = parse_range(self.start.as_deref(), self.end.as_deref())?;
        Ok(MentionFilter::keywords(keywords).with_range(start, end))
    }
}

/// Result of executing a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub status: String,
    pub mode: RuleMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub data: Vec<JsonValue>,
}

impl RuleOutcome {
    fn success(mode: RuleMode) -> Self {
        Self {
            status: "success".to_string(),
            mode,
            message: None,
            sql: None,
            explanation: None,
            data: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
struct SqlReply {
    sql: String,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Deserialize)]
struct FilterReply {
    #[serde(default)]
    ids: Vec<JsonValue>,
    #[serde(default)]
    explanation: Option<String>,
}

/// Remove a surrounding Markdown code fence, if any.
#[must_use]
pub fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (```json) on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

fn parse_json_reply<T: DeserializeOwned>(reply: &str) -> Result<T> {
    serde_json::from_str(strip_code_fences(reply))
        .map_err(|e| ExplorerError::llm_response(format!("expected a JSON object: {e}")))
}

/// Trim whitespace and a single statement terminator from generated SQL.
fn trim_generated_sql(sql: &str) -> &str {
    let trimmed = sql.trim();
    trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end()
}

fn reply_id(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Turn an analyze-mode reply into an outcome.
///
/// Non-JSON replies are kept verbatim as the message.
fn analysis_outcome(reply: &str) -> RuleOutcome {
    let mut outcome = RuleOutcome::success(RuleMode::Analyze);
    match serde_json::from_str::<JsonValue>(strip_code_fences(reply)) {
        Ok(JsonValue::Object(mut object)) => {
            outcome.explanation = object
                .remove("explanation")
                .and_then(|v| v.as_str().map(str::to_string));
            outcome.data = match object.remove("data") {
                Some(JsonValue::Array(items)) => items,
                Some(JsonValue::Null) | None => Vec::new(),
                Some(other) => vec![other],
            };
        }
        Ok(JsonValue::Array(items)) => outcome.data = items,
        Ok(JsonValue::String(text)) => outcome.message = Some(text.trim().to_string()),
        _ => outcome.message = Some(reply.trim().to_string()),
    }
    outcome
}

struct Prompt<'a> {
    task: &'a str,
    filter: &'a MentionFilter,
    context: Option<&'a JsonValue>,
}

impl Prompt<'_> {
    fn render(&self, mentions: Option<&[Mention]>) -> String {
        let mut out = format!("Request: {}\n\nActive filters: {}\n", self.task, self.filter.describe());

        if let Some(context) = self.context {
            let _ = write!(out, "\nPrevious result:\n{context}\n");
        }

        if let Some(mentions) = mentions {
            let _ = write!(out, "\nMentions ({}):\n", mentions.len());
            for mention in mentions {
                let line = serde_json::json!({
                    "id": mention.id,
                    "author": mention.author,
                    "date": mention.date,
                    "keyword": mention.keyword,
                    "sentiment": mention.sentiment,
                    "content": mention.content.as_deref().map(|c| truncate_text(c, PROMPT_CONTENT_CHARS)),
                });
                let _ = writeln!(out, "{line}");
            }
        }
        out
    }
}

/// Executes saved rules against the store and a language model.
#[derive(Clone)]
pub struct RuleEngine {
    storage: SharedStorage,
    provider: Option<Arc<dyn CompletionProvider>>,
    context_limit: u32,
}

impl RuleEngine {
    /// `provider` may be `None`, in which case every execution fails with
    /// [`ExplorerError::LlmNotConfigured`].
    #[must_use]
    pub fn new(
        storage: SharedStorage,
        provider: Option<Arc<dyn CompletionProvider>>,
        context_limit: u32,
    ) -> Self {
        Self {
            storage,
            provider,
            context_limit,
        }
    }

    /// Whether a model is available.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    /// Execute one rule.
    ///
    /// # Errors
    ///
    /// Returns [`ExplorerError::NotFound`] for an unknown rule, a date error
    /// for bad bounds, and LLM or generated-SQL errors from the mode itself.
    pub async fn execute(&self, request: RuleExecution) -> Result<RuleOutcome> {
        let guard = OperationGuard::new(format!("execute rule {}", request.rule_id));
        let result = self.execute_inner(&request).await;
        guard.finish(&result);
        result
    }

    async fn execute_inner(&self, request: &RuleExecution) -> Result<RuleOutcome> {
        let rule_id = request.rule_id;
        let rule = with_storage(&self.storage, move |s| s.get_rule(rule_id))
            .await?
            .ok_or_else(|| ExplorerError::not_found("Rule", rule_id.to_string()))?;

        let filter = request.filter()?;
        let provider = self
            .provider
            .as_deref()
            .ok_or_else(|| ExplorerError::LlmNotConfigured {
                reason: "no API key configured".to_string(),
            })?;

        let (mode, task) = RuleMode::detect(&rule.instruction);
        info!(rule_id, mode = mode.as_str(), "Executing rule");

        let prompt = Prompt {
            task,
            filter: &filter,
            context: request.context.as_ref(),
        };

        match mode {
            RuleMode::Sql => self.run_sql(provider, &prompt).await,
            RuleMode::Filter => self.run_filter(provider, &prompt).await,
            RuleMode::Analyze => self.run_analyze(provider, &prompt).await,
        }
    }

    async fn run_sql(
        &self,
        provider: &dyn CompletionProvider,
        prompt: &Prompt<'_>,
    ) -> Result<RuleOutcome> {
        let request = CompletionRequest::new(SQL_SYSTEM_PROMPT, prompt.render(None)).json();
        let reply: SqlReply = parse_json_reply(&provider.complete(&request).await?)?;

        let sql = trim_generated_sql(&reply.sql).to_string();
        if sql.is_empty() {
            return Err(ExplorerError::llm_response("model returned an empty query"));
        }
        debug!(%sql, "Running generated SQL");

        let query = sql.clone();
        let rows = with_storage(&self.storage, move |s| s.run_query(&query)).await?;

        let mut outcome = RuleOutcome::success(RuleMode::Sql);
        outcome.sql = Some(sql);
        outcome.explanation = reply.explanation;
        outcome.data = rows.into_iter().map(JsonValue::Object).collect();
        Ok(outcome)
    }

    async fn run_filter(
        &self,
        provider: &dyn CompletionProvider,
        prompt: &Prompt<'_>,
    ) -> Result<RuleOutcome> {
        let mentions = self.context_mentions(prompt.filter).await?;
        if mentions.is_empty() {
            let mut outcome = RuleOutcome::success(RuleMode::Filter);
            outcome.message = Some("No mentions matched the selected filters.".to_string());
            return Ok(outcome);
        }

        let request =
            CompletionRequest::new(FILTER_SYSTEM_PROMPT, prompt.render(Some(&mentions))).json();
        let reply: FilterReply = parse_json_reply(&provider.complete(&request).await?)?;
        let wanted: HashSet<i64> = reply.ids.iter().filter_map(reply_id).collect();

        let mut outcome = RuleOutcome::success(RuleMode::Filter);
        outcome.explanation = reply.explanation;
        outcome.data = mentions
            .into_iter()
            .filter(|m| wanted.contains(&m.id))
            .map(serde_json::to_value)
            .collect::<serde_json::Result<Vec<_>>>()?;
        Ok(outcome)
    }

    async fn run_analyze(
        &self,
        provider: &dyn CompletionProvider,
        prompt: &Prompt<'_>,
    ) -> Result<RuleOutcome> {
        let mentions = self.context_mentions(prompt.filter).await?;
        let request =
            CompletionRequest::new(ANALYZE_SYSTEM_PROMPT, prompt.render(Some(&mentions))).json();
        let reply = provider.complete(&request).await?;
        Ok(analysis_outcome(&reply))
    }

    async fn context_mentions(&self, filter: &MentionFilter) -> Result<Vec<Mention>> {
        let filter = filter.clone();
        let page = Page {
            limit: self.context_limit,
            offset: 0,
        };
        with_storage(&self.storage, move |s| s.mentions(&filter, page)).await
    }
}
