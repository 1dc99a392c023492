use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::auth::CredentialBroker;
use crate::core::config::PlatformSettings;
use crate::core::errors::PlatformError;
use crate::core::http::{self, SEARCH_TIMEOUT};

pub const MIN_LIMIT: u32 = 1;
pub const MAX_LIMIT: u32 = 100;
/// Used when a search is asked for zero or fewer results.
pub const DEFAULT_LIMIT: u32 = 10;

/// One search hit. Serializes back into the platform's own
/// `{uuid, properties, metadata}` shape so proxied results read the same
/// as direct ones.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub content_type: String,
    pub authors: Vec<String>,
    pub snippet_text: String,
    pub certainty: f64,
}

impl Serialize for SearchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Properties<'a> {
            item_title: &'a str,
            #[serde(rename = "type")]
            kind: &'a str,
            author: &'a [String],
            snippet: &'a str,
        }

        #[derive(Serialize)]
        struct Metadata {
            certainty: f64,
        }

        #[derive(Serialize)]
        struct Hit<'a> {
            uuid: &'a str,
            properties: Properties<'a>,
            metadata: Metadata,
        }

        Hit {
            uuid: &self.id,
            properties: Properties {
                item_title: &self.title,
                kind: &self.content_type,
                author: &self.authors,
                snippet: &self.snippet_text,
            },
            metadata: Metadata {
                certainty: self.certainty,
            },
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Server-assigned order.
    #[default]
    Relevance,
    /// Descending certainty, ties keep server order.
    Certainty,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "relevance" => Ok(SortOrder::Relevance),
            "certainty" => Ok(SortOrder::Certainty),
            other => Err(format!("unknown sort order '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub limit: u32,
    pub min_certainty: f64,
    pub sort: SortOrder,
}

impl SearchQuery {
    /// A limit of zero uses [`DEFAULT_LIMIT`]; above 100 clamps to 100.
    pub fn new(query: impl Into<String>, limit: u32, min_certainty: f64) -> Self {
        Self::with_fallback(query, limit, DEFAULT_LIMIT, min_certainty)
    }

    /// Like [`SearchQuery::new`] with the caller's own default limit.
    pub fn with_fallback(
        query: impl Into<String>,
        limit: u32,
        fallback: u32,
        min_certainty: f64,
    ) -> Self {
        Self {
            query: query.into(),
            limit: clamp_limit(i64::from(limit), fallback),
            min_certainty,
            sort: SortOrder::Relevance,
        }
    }

    pub fn sorted_by(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }
}

/// Keeps a limit within `[1, 100]`. Values above the range clamp to 100;
/// zero or negative values mean "not given" and use `fallback`.
pub fn clamp_limit(value: i64, fallback: u32) -> u32 {
    if value < MIN_LIMIT as i64 {
        return fallback.clamp(MIN_LIMIT, MAX_LIMIT);
    }
    value.min(MAX_LIMIT as i64) as u32
}

/// Parses a user-supplied limit; anything unparsable uses `fallback`.
pub fn normalize_limit(raw: &str, fallback: u32) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(value) => clamp_limit(value, fallback),
        Err(_) => fallback.clamp(MIN_LIMIT, MAX_LIMIT),
    }
}

/// Same as [`normalize_limit`] for JSON inputs (number or numeric string).
pub fn normalize_limit_value(value: Option<&Value>, fallback: u32) -> u32 {
    match value {
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => clamp_limit(v, fallback),
            None => fallback.clamp(MIN_LIMIT, MAX_LIMIT),
        },
        Some(Value::String(s)) => normalize_limit(s, fallback),
        _ => fallback.clamp(MIN_LIMIT, MAX_LIMIT),
    }
}

/// Keeps results whose content type is one of `content_types`.
pub fn filter_by_content_type(results: Vec<SearchResult>, content_types: &[String]) -> Vec<SearchResult> {
    results
        .into_iter()
        .filter(|r| content_types.iter().any(|t| t == &r.content_type))
        .collect()
}

pub fn sort_results(results: &mut [SearchResult], sort: SortOrder) {
    if sort == SortOrder::Certainty {
        // sort_by is stable, so equal certainties keep server order.
        results.sort_by(|a, b| {
            b.certainty
                .partial_cmp(&a.certainty)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
    }
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, PlatformError>;
}

#[derive(Clone)]
pub struct SearchClient {
    client: Client,
    broker: Arc<CredentialBroker>,
    search_url: String,
    tenant: String,
    collection: String,
}

impl SearchClient {
    pub fn new(client: Client, broker: Arc<CredentialBroker>, settings: &PlatformSettings) -> Self {
        Self {
            client,
            broker,
            search_url: settings.search_url(),
            tenant: settings.tenant.clone(),
            collection: settings.collection.clone(),
        }
    }

    pub async fn search(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;

        let body = json!({
            "query": query.query,
            "collection": self.collection,
            "tenant": self.tenant,
            "limit": query.limit,
            "certainty": query.min_certainty,
        });
        let request = self.client.post(&self.search_url).bearer_auth(token).json(&body);

        let reply = http::send(request, SEARCH_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(PlatformError::Search {
                status: reply.status.as_u16(),
                detail: reply.detail(),
            });
        }

        let mut results = parse_results(&reply.json::<Value>()?)?;
        sort_results(&mut results, query.sort);
        tracing::debug!("Search '{}' returned {} results", query.query, results.len());
        Ok(results)
    }
}

#[async_trait]
impl Retriever for SearchClient {
    async fn retrieve(
        &self,
        query: &SearchQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, PlatformError> {
        self.search(query, cancel).await
    }
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireHit {
    uuid: Option<String>,
    id: Option<String>,
    properties: WireProperties,
    metadata: WireMetadata,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireProperties {
    item_title: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    author: Option<Value>,
    snippet: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireMetadata {
    certainty: Option<f64>,
}

fn parse_results(payload: &Value) -> Result<Vec<SearchResult>, PlatformError> {
    let items = match payload.get("data") {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => {
            return Err(PlatformError::Parse(
                "search response 'data' is not an array".to_string(),
            ))
        }
    };

    items
        .iter()
        .map(|item| {
            let hit: WireHit = serde_json::from_value(item.clone())
                .map_err(|e| PlatformError::Parse(format!("search result: {}", e)))?;
            Ok(SearchResult {
                id: hit.uuid.or(hit.id).unwrap_or_default(),
                title: hit.properties.item_title.unwrap_or_else(|| "N/A".to_string()),
                content_type: hit.properties.kind.unwrap_or_else(|| "N/A".to_string()),
                authors: parse_authors(hit.properties.author),
                snippet_text: hit.properties.snippet.unwrap_or_default(),
                certainty: hit.metadata.certainty.unwrap_or(0.0).clamp(0.0, 1.0),
            })
        })
        .collect()
}

fn parse_authors(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(name)) if !name.is_empty() => vec![name],
        _ => Vec::new(),
    }
}
