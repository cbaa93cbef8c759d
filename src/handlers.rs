//! Request handlers for the HTTP API.
//!
//! Every database call goes through [`with_storage`] so `SQLite` work stays
//! off the async executor.

use crate::analytics::{self, MentionsPage};
use crate::date_parser::parse_range;
use crate::model::{AuthorStat, CountByDay, KeywordStat, Rule, RuleDraft, UniqueAuthors};
use crate::query::{KeywordSelection, MentionFilter, Page};
use crate::rules::{RuleExecution, RuleOutcome};
use crate::server::AppState;
use crate::storage::with_storage;
use crate::{ExplorerError, Result};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use tracing::{debug, error};

type ApiResult<T> = std::result::Result<Json<T>, ExplorerError>;

impl IntoResponse for ExplorerError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            debug!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// =============================================================================
// Query parameters
// =============================================================================

/// `?keyword&start&end`
#[derive(Debug, Default, Deserialize)]
pub struct FilterParams {
    #[serde(default, alias = "keywords")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// `GET /api/mentions` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct MentionParams {
    #[serde(default, alias = "keywords")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

/// `GET /api/stats/authors` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct AuthorParams {
    #[serde(default, alias = "keywords")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// `GET /api/stats/counts-by-day` parameters.
#[derive(Debug, Default, Deserialize)]
pub struct DayParams {
    #[serde(default, alias = "keywords")]
    pub keyword: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub split_sentiment: bool,
}

/// `POST /api/rules?id=N`
#[derive(Debug, Default, Deserialize)]
pub struct RuleIdParam {
    #[serde(default)]
    pub id: Option<i64>,
}

fn build_filter(
    keyword: Option<&str>,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<MentionFilter> {
    let (start, end) = parse_range(start, end)?;
    Ok(MentionFilter::keywords(KeywordSelection::parse(keyword)).with_range(start, end))
}

impl FilterParams {
    fn filter(&self) -> Result<MentionFilter> {
        build_filter(
            self.keyword.as_deref(),
            self.start.as_deref(),
            self.end.as_deref(),
        )
    }
}

// =============================================================================
// Mentions and statistics
// =============================================================================

pub async fn health(State(state): State<AppState>) -> ApiResult<JsonValue> {
    with_storage(&state.storage, |s| s.ping()).await?;
    Ok(Json(json!({ "status": "ok" })))
}

pub async fn keywords(State(state): State<AppState>) -> ApiResult<Vec<KeywordStat>> {
    let overview = with_storage(&state.storage, |s| analytics::keyword_overview(s)).await?;
    Ok(Json(overview))
}

pub async fn mentions(
    State(state): State<AppState>,
    Query(params): Query<MentionParams>,
) -> ApiResult<MentionsPage> {
    let filter = build_filter(
        params.keyword.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    )?;
    let page = Page::clamped(
        params.limit.unwrap_or(state.limits.default_limit),
        params.offset.unwrap_or(0),
        state.limits.max_limit,
    );

    let mentions = with_storage(&state.storage, move |s| s.mentions(&filter, page)).await?;
    Ok(Json(MentionsPage { mentions }))
}

pub async fn unique_authors(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<UniqueAuthors> {
    let filter = params.filter()?;
    let count = with_storage(&state.storage, move |s| s.unique_author_count(&filter)).await?;
    Ok(Json(UniqueAuthors { count }))
}

pub async fn top_authors(
    State(state): State<AppState>,
    Query(params): Query<AuthorParams>,
) -> ApiResult<Vec<AuthorStat>> {
    let filter = build_filter(
        params.keyword.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    )?;
    let limit = params
        .limit
        .unwrap_or(state.limits.authors_limit)
        .min(state.limits.max_limit);

    let authors = with_storage(&state.storage, move |s| s.top_authors(&filter, limit)).await?;
    Ok(Json(authors))
}

pub async fn counts_by_day(
    State(state): State<AppState>,
    Query(params): Query<DayParams>,
) -> ApiResult<Vec<CountByDay>> {
    let filter = build_filter(
        params.keyword.as_deref(),
        params.start.as_deref(),
        params.end.as_deref(),
    )?;
    let split = params.split_sentiment;
    let days = with_storage(&state.storage, move |s| s.counts_by_day(&filter, split)).await?;
    Ok(Json(days))
}

pub async fn sentiment(
    State(state): State<AppState>,
    Query(params): Query<FilterParams>,
) -> ApiResult<BTreeMap<String, i64>> {
    let filter = params.filter()?;
    let breakdown =
        with_storage(&state.storage, move |s| analytics::sentiment_breakdown(s, &filter)).await?;
    Ok(Json(breakdown))
}

// =============================================================================
// Rules
// =============================================================================

pub async fn list_rules(State(state): State<AppState>) -> ApiResult<Vec<Rule>> {
    let rules = with_storage(&state.storage, |s| s.list_rules()).await?;
    Ok(Json(rules))
}

pub async fn get_rule(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<Rule> {
    with_storage(&state.storage, move |s| s.get_rule(id))
        .await?
        .map(Json)
        .ok_or_else(|| ExplorerError::not_found("Rule", id.to_string()))
}

/// Create a rule, or update one when `?id=` names an existing rule.
pub async fn save_rule(
    State(state): State<AppState>,
    Query(param): Query<RuleIdParam>,
    Json(draft): Json<RuleDraft>,
) -> ApiResult<Rule> {
    draft.validate()?;

    match param.id.filter(|id| *id != 0) {
        Some(id) => with_storage(&state.storage, move |s| s.update_rule(id, &draft))
            .await?
            .map(Json)
            .ok_or_else(|| ExplorerError::not_found("Rule", id.to_string())),
        None => {
            let rule = with_storage(&state.storage, move |s| s.create_rule(&draft)).await?;
            Ok(Json(rule))
        }
    }
}

pub async fn delete_rule(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<JsonValue> {
    let removed = with_storage(&state.storage, move |s| s.delete_rule(id)).await?;
    debug!(id, removed, "Delete rule");
    Ok(Json(json!({ "status": "deleted", "id": id })))
}

pub async fn execute_rule(
    State(state): State<AppState>,
    Json(request): Json<RuleExecution>,
) -> ApiResult<RuleOutcome> {
    let outcome = state.rules.execute(request).await?;
    Ok(Json(outcome))
}
