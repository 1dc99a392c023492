//! Query → answer orchestration.
//!
//! A run walks `Idle → Authenticating → Searching → Extracting → Composing →
//! Generating → Done` strictly in order. The first failure ends the run in
//! `Failed(kind)` and is returned with the stage it happened in; nothing is
//! retried and no partial result survives. A search with zero hits ends in
//! `Done` without a generation call.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::context_builder::{self, SourceRef};
use super::snippets;
use crate::auth::CredentialBroker;
use crate::core::config::RagSettings;
use crate::core::errors::{ErrorKind, PlatformError};
use crate::llm::{GenerationRequest, Generator};
use crate::search::{clamp_limit, filter_by_content_type, Retriever, SearchQuery, SortOrder};

pub const NO_CONTENT_ANSWER: &str = "No relevant content found.";
/// Search limit for a run whose options carry a zero limit.
pub const DEFAULT_RAG_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Authenticating,
    Searching,
    Extracting,
    Composing,
    Generating,
    Done,
    Failed(ErrorKind),
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Idle => f.write_str("idle"),
            PipelineStage::Authenticating => f.write_str("authenticating"),
            PipelineStage::Searching => f.write_str("searching"),
            PipelineStage::Extracting => f.write_str("extracting"),
            PipelineStage::Composing => f.write_str("composing"),
            PipelineStage::Generating => f.write_str("generating"),
            PipelineStage::Done => f.write_str("done"),
            PipelineStage::Failed(kind) => write!(f, "failed({})", kind),
        }
    }
}

#[derive(Debug, Error)]
#[error("{stage} failed: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    pub source: PlatformError,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

#[derive(Debug, Clone)]
pub struct RagOptions {
    /// Search limit; zero means [`DEFAULT_RAG_LIMIT`], above 100 clamps.
    pub limit: u32,
    pub sort: SortOrder,
    pub system_prompt: Option<String>,
    pub content_types: Option<Vec<String>>,
    pub min_certainty: f64,
    pub max_snippets: usize,
    pub max_chars_per_snippet: usize,
    pub max_tokens: u32,
}

impl RagOptions {
    pub fn from_settings(settings: &RagSettings) -> Self {
        Self {
            limit: settings.default_rag_limit,
            sort: SortOrder::Relevance,
            system_prompt: None,
            content_types: None,
            min_certainty: settings.min_certainty,
            max_snippets: settings.max_snippets,
            max_chars_per_snippet: settings.max_chars_per_snippet,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn search_limit(&self) -> u32 {
        clamp_limit(i64::from(self.limit), DEFAULT_RAG_LIMIT)
    }

    pub fn snippet_cap(&self) -> usize {
        (self.search_limit() as usize).min(self.max_snippets)
    }
}

impl Default for RagOptions {
    fn default() -> Self {
        Self::from_settings(&RagSettings::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagAnswer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
    pub model_id: Option<String>,
    pub sources_returned: bool,
    /// Stages visited, ending in `Done`.
    #[serde(skip)]
    pub stages: Vec<PipelineStage>,
}

struct StageTracker {
    current: PipelineStage,
    history: Vec<PipelineStage>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            current: PipelineStage::Idle,
            history: vec![PipelineStage::Idle],
        }
    }

    fn advance(&mut self, next: PipelineStage) {
        tracing::debug!("RAG pipeline {} -> {}", self.current, next);
        self.current = next;
        self.history.push(next);
    }

    fn fail(&mut self, source: PlatformError) -> PipelineError {
        let stage = self.current;
        self.advance(PipelineStage::Failed(source.kind()));
        PipelineError { stage, source }
    }
}

pub struct RagPipeline {
    broker: Arc<CredentialBroker>,
    retriever: Arc<dyn Retriever>,
    generator: Arc<dyn Generator>,
}

impl RagPipeline {
    pub fn new(
        broker: Arc<CredentialBroker>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            broker,
            retriever,
            generator,
        }
    }

    pub async fn run(
        &self,
        query: &str,
        options: &RagOptions,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer, PipelineError> {
        let mut tracker = StageTracker::new();
        let outcome = self.run_stages(&mut tracker, query, options, cancel).await;
        match &outcome {
            Ok(answer) => tracing::info!(
                "RAG query answered with {} sources (model: {})",
                answer.sources.len(),
                answer.model_id.as_deref().unwrap_or("none")
            ),
            Err(err) => tracing::warn!("RAG query failed while {}: {}", err.stage, err.source),
        }
        outcome
    }

    async fn run_stages(
        &self,
        tracker: &mut StageTracker,
        query: &str,
        options: &RagOptions,
        cancel: &CancellationToken,
    ) -> Result<RagAnswer, PipelineError> {
        tracker.advance(PipelineStage::Authenticating);
        self.broker
            .ensure_valid(cancel)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Searching);
        let search_query =
            SearchQuery::with_fallback(query, options.limit, DEFAULT_RAG_LIMIT, options.min_certainty)
                .sorted_by(options.sort);
        let mut results = self
            .retriever
            .retrieve(&search_query, cancel)
            .await
            .map_err(|e| tracker.fail(e))?;
        if let Some(types) = options.content_types.as_deref().filter(|t| !t.is_empty()) {
            results = filter_by_content_type(results, types);
        }

        if results.is_empty() {
            tracker.advance(PipelineStage::Done);
            return Ok(RagAnswer {
                answer: NO_CONTENT_ANSWER.to_string(),
                sources: Vec::new(),
                model_id: None,
                sources_returned: false,
                stages: std::mem::take(&mut tracker.history),
            });
        }

        tracker.advance(PipelineStage::Extracting);
        let snippets =
            snippets::extract(&results, options.snippet_cap(), options.max_chars_per_snippet);

        tracker.advance(PipelineStage::Composing);
        let context = context_builder::compose(&snippets);

        tracker.advance(PipelineStage::Generating);
        let request = GenerationRequest::with_context(query, context, options.max_tokens)
            .system_prompt(options.system_prompt.clone());
        let generated = self
            .generator
            .generate(&request, cancel)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Done);
        Ok(RagAnswer {
            answer: generated.answer_text,
            sources: context_builder::sources(&snippets),
            model_id: Some(generated.model_id),
            sources_returned: generated.sources_returned,
            stages: std::mem::take(&mut tracker.history),
        })
    }
}
