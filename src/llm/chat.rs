//! Stateful chat sessions on the message API.
//!
//! The platform keeps the conversation: the first message opens a chat and
//! returns its `chat_id`, later messages pass that id back, and the full
//! transcript can be fetched at any time.

use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::auth::CredentialBroker;
use crate::core::config::PlatformSettings;
use crate::core::errors::PlatformError;
use crate::core::http::{self, HttpReply, CHAT_HISTORY_TIMEOUT, GENERATION_TIMEOUT};

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOptions {
    pub character_limit: u32,
    pub sources_limit: u32,
    /// Ask the platform for follow-up question suggestions.
    pub suggestions: bool,
    pub publishers: Vec<String>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            character_limit: 1000,
            sources_limit: 5,
            suggestions: true,
            publishers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatReply {
    pub chat_id: String,
    #[serde(default)]
    pub query_id: String,
    #[serde(default)]
    pub message_id: String,
    pub message: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub sources: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatEntry {
    #[serde(default)]
    pub query_id: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub timestamp: String,
    pub role: String,
    pub message: String,
    #[serde(default)]
    pub character_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChatHistory {
    pub chat_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub messages: Vec<ChatEntry>,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    broker: Arc<CredentialBroker>,
    message_url: String,
    chat_url: String,
}

impl ChatClient {
    pub fn new(client: Client, broker: Arc<CredentialBroker>, settings: &PlatformSettings) -> Self {
        Self {
            client,
            broker,
            message_url: settings.message_url(),
            chat_url: settings.chat_url(),
        }
    }

    /// Sends `text`, opening a new chat when `chat_id` is `None`.
    pub async fn send_message(
        &self,
        text: &str,
        chat_id: Option<&str>,
        options: &ChatOptions,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;
        let body = message_body(text, chat_id, options);
        let request = self.client.post(&self.message_url).bearer_auth(token).json(&body);

        let reply = http::send(request, GENERATION_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(chat_failure(&reply));
        }

        let parsed: ChatReply = reply.json()?;
        tracing::debug!(
            "Chat {} replied with {} suggestions",
            parsed.chat_id,
            parsed.suggestions.len()
        );
        Ok(parsed)
    }

    pub async fn history(
        &self,
        chat_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatHistory, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;
        let request = self
            .client
            .get(&self.chat_url)
            .bearer_auth(token)
            .query(&[("chat_id", chat_id)]);

        let reply = http::send(request, CHAT_HISTORY_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(chat_failure(&reply));
        }
        reply.json()
    }
}

fn message_body(text: &str, chat_id: Option<&str>, options: &ChatOptions) -> Value {
    let mut body = json!({
        "query": text,
        "character_limit": options.character_limit,
        "sources_limit": options.sources_limit,
        "stream": false,
        "publishers": options.publishers,
        "enable_suggestions": u8::from(options.suggestions),
    });
    if let (Some(id), Some(obj)) = (chat_id, body.as_object_mut()) {
        obj.insert("chat_id".to_string(), json!(id));
    }
    body
}

fn chat_failure(reply: &HttpReply) -> PlatformError {
    PlatformError::Chat {
        status: Some(reply.status.as_u16()),
        message: reply
            .detail()
            .unwrap_or_else(|| reply.body.chars().take(MAX_ERROR_BODY_CHARS).collect()),
    }
}
