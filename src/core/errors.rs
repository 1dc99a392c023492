use std::fmt;

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::rag::PipelineError;

/// Coarse classification shared by every failure the platform calls can
/// produce. Surfaced to callers (CLI output, proxy JSON) instead of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Network,
    Timeout,
    Cancelled,
    Search,
    Generation,
    Chat,
    Parse,
    Config,
    Ingestion,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Network => "network",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Search => "search",
            ErrorKind::Generation => "generation",
            ErrorKind::Chat => "chat",
            ErrorKind::Parse => "parse",
            ErrorKind::Config => "config",
            ErrorKind::Ingestion => "ingestion",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("request cancelled")]
    Cancelled,
    #[error("search failed with status {status}{}", detail_suffix(.detail))]
    Search { status: u16, detail: Option<String> },
    #[error("generation failed: {message}")]
    Generation { status: Option<u16>, message: String },
    #[error("chat request failed: {message}")]
    Chat { status: Option<u16>, message: String },
    #[error("malformed response: {0}")]
    Parse(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("ingestion failed: {0}")]
    Ingestion(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {}", detail),
        None => String::new(),
    }
}

impl PlatformError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PlatformError::Auth(_) => ErrorKind::Auth,
            PlatformError::Network(_) => ErrorKind::Network,
            PlatformError::Timeout(_) => ErrorKind::Timeout,
            PlatformError::Cancelled => ErrorKind::Cancelled,
            PlatformError::Search { .. } => ErrorKind::Search,
            PlatformError::Generation { .. } => ErrorKind::Generation,
            PlatformError::Chat { .. } => ErrorKind::Chat,
            PlatformError::Parse(_) => ErrorKind::Parse,
            PlatformError::Config(_) => ErrorKind::Config,
            PlatformError::Ingestion(_) => ErrorKind::Ingestion,
        }
    }

    /// Remote error text, when the server supplied one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            PlatformError::Search { detail, .. } => detail.as_deref(),
            PlatformError::Generation {
                status: Some(_),
                message,
            }
            | PlatformError::Chat {
                status: Some(_),
                message,
            } => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn config<E: fmt::Display>(err: E) -> Self {
        PlatformError::Config(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Upstream(#[from] PipelineError),
    #[error("{0}")]
    Platform(#[from] PlatformError),
}

fn failure_body(error: &str, source: &PlatformError) -> serde_json::Value {
    json!({
        "error": error,
        "kind": source.kind(),
        "message": source.to_string(),
        "detail": source.detail(),
    })
}

fn platform_status(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Auth | ErrorKind::Config => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            ApiError::Upstream(err) => {
                tracing::warn!("RAG request failed in {:?}: {}", err.stage, err.source);
                (
                    platform_status(err.kind()),
                    failure_body("RAG request failed", &err.source),
                )
            }
            ApiError::Platform(err) => {
                tracing::warn!("Platform request failed: {}", err);
                (
                    platform_status(err.kind()),
                    failure_body("Search request failed", err),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
