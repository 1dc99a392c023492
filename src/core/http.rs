//! Shared outbound call helper.
//!
//! Every platform call goes through [`send`], which applies the per-call
//! timeout, races the caller's cancellation token and maps transport
//! failures onto [`PlatformError`]. Status handling is left to the caller
//! because each endpoint reports failures under its own error kind.

use std::time::Duration;

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::errors::PlatformError;

pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(30);
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(60);
pub const GENERATION_TIMEOUT: Duration = Duration::from_secs(60);
pub const CHAT_HISTORY_TIMEOUT: Duration = Duration::from_secs(30);
pub const INGEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Fully-read response: status plus raw body text.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, PlatformError> {
        serde_json::from_str(&self.body).map_err(|e| PlatformError::Parse(e.to_string()))
    }

    /// The `detail` field of a JSON error body (FastAPI style), if any.
    pub fn detail(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        match value.get("detail")? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

pub async fn send(
    request: RequestBuilder,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<HttpReply, PlatformError> {
    let call = async {
        let response = request
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| map_transport(e, timeout))?;
        Ok(HttpReply { status, body })
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlatformError::Cancelled),
        reply = call => reply,
    }
}

fn map_transport(err: reqwest::Error, timeout: Duration) -> PlatformError {
    if err.is_timeout() {
        PlatformError::Timeout(timeout.as_secs())
    } else {
        PlatformError::Network(err.to_string())
    }
}
