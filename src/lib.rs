//! Credential-managed retrieval-augmented generation client for the Gloo AI
//! platform, plus the CLI, proxy server and ingestion tooling built on it.

pub mod auth;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod search;
pub mod server;
pub mod state;

#[cfg(test)]
mod test_support;
