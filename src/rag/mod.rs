//! Retrieval-augmented answering: snippet extraction, context composition
//! and the staged pipeline that ties search and generation together.

mod context_builder;
mod pipeline;
mod snippets;

pub use context_builder::{compose, sources, SourceRef, BLOCK_SEPARATOR};
pub use pipeline::{
    PipelineError, PipelineStage, RagAnswer, RagOptions, RagPipeline, DEFAULT_RAG_LIMIT,
    NO_CONTENT_ANSWER,
};
pub use snippets::{extract, Snippet};
