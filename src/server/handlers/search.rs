use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::core::errors::ApiError;
use crate::search::{normalize_limit, normalize_limit_value, SearchQuery, SortOrder, MAX_LIMIT, MIN_LIMIT};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagRequest {
    pub query: Option<String>,
    pub limit: Option<Value>,
    pub system_prompt: Option<String>,
    pub sort_by: Option<String>,
    pub content_types: Option<Vec<String>>,
}

fn required_query(raw: Option<&str>, message: &str) -> Result<String, ApiError> {
    raw.map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

pub async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let query = required_query(params.q.as_deref(), "Query parameter 'q' is required")?;
    let fallback = state.settings.rag.default_search_limit;
    let limit = match params.limit.as_deref() {
        Some(raw) => normalize_limit(raw, fallback),
        None => fallback.clamp(MIN_LIMIT, MAX_LIMIT),
    };

    // Fires when the client goes away and this future is dropped.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let search_query = SearchQuery::new(query, limit, state.settings.rag.min_certainty);
    let results = state.search.search(&search_query, &cancel).await?;
    Ok(Json(json!({ "data": results })))
}

pub async fn rag(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = required_query(payload.query.as_deref(), "Field 'query' is required")?;

    let mut options = state.rag_options();
    options.limit = normalize_limit_value(payload.limit.as_ref(), options.limit);
    options.system_prompt = payload.system_prompt;
    options.content_types = payload.content_types;
    if let Some(sort_by) = payload.sort_by.as_deref() {
        options.sort = sort_by.parse::<SortOrder>().map_err(ApiError::BadRequest)?;
    }

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let answer = state.pipeline.run(&query, &options, &cancel).await?;
    Ok(Json(json!({
        "response": answer.answer,
        "sources": answer.sources,
    })))
}
