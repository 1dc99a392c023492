use std::path::Path;
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use reqwest::Client;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{has_extension, ingestion_failure};
use crate::auth::CredentialBroker;
use crate::core::config::validation::require_publisher_id;
use crate::core::config::PlatformSettings;
use crate::core::errors::PlatformError;
use crate::core::http::{self, INGEST_TIMEOUT};

pub const REALTIME_EXTENSIONS: [&str; 2] = ["txt", "md"];

const AUTOMATED_AUTHOR: &str = "Automated Ingestion";

/// Pushes text content to the realtime ingestion endpoint.
#[derive(Clone)]
pub struct RealtimeUploader {
    client: Client,
    broker: Arc<CredentialBroker>,
    upload_url: String,
    publisher_id: String,
}

impl RealtimeUploader {
    pub fn new(
        client: Client,
        broker: Arc<CredentialBroker>,
        settings: &PlatformSettings,
    ) -> Result<Self, PlatformError> {
        let publisher_id = require_publisher_id(settings)?.to_string();
        Ok(Self {
            client,
            broker,
            upload_url: settings.realtime_upload_url(),
            publisher_id,
        })
    }

    pub fn is_supported(path: &Path) -> bool {
        has_extension(path, &REALTIME_EXTENSIONS)
    }

    /// Uploads one piece of content and returns the server's message.
    pub async fn upload_text(
        &self,
        title: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<String, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;
        let body = self.content_body(title, content, Local::now().date_naive());
        let request = self.client.post(&self.upload_url).bearer_auth(token).json(&body);

        let reply = http::send(request, INGEST_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(ingestion_failure("realtime upload", &reply));
        }

        let payload: Value = reply.json()?;
        let message = payload
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("uploaded")
            .to_string();
        tracing::info!("Uploaded '{}': {}", title, message);
        Ok(message)
    }

    /// Reads a `.txt`/`.md` file and uploads it under a title derived from
    /// its file name.
    pub async fn process_file(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, PlatformError> {
        if !path.exists() {
            return Err(PlatformError::Ingestion(format!(
                "file does not exist: {}",
                path.display()
            )));
        }
        if !Self::is_supported(path) {
            return Err(PlatformError::Ingestion(format!(
                "unsupported file type: {}",
                path.display()
            )));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            PlatformError::Ingestion(format!("failed to read {}: {}", path.display(), e))
        })?;
        let content = String::from_utf8(bytes).map_err(|_| {
            PlatformError::Ingestion(format!("file is not valid UTF-8: {}", path.display()))
        })?;
        if content.trim().is_empty() {
            return Err(PlatformError::Ingestion(format!(
                "file is empty: {}",
                path.display()
            )));
        }

        let title = title_from_path(path);
        self.upload_text(&title, &content, cancel).await
    }

    fn content_body(&self, title: &str, content: &str, date: NaiveDate) -> Value {
        json!({
            "content": content,
            "publisherId": self.publisher_id,
            "item_title": title,
            "author": [AUTOMATED_AUTHOR],
            "publication_date": date.format("%Y-%m-%d").to_string(),
            "type": "Article",
            "pub_type": "technical",
            "item_tags": ["automated", "ingestion"],
            "evergreen": true,
            "drm": ["aspen", "kallm"],
        })
    }
}

/// `my_first-post.md` → `My First Post`.
pub fn title_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_default();

    let mut title = String::with_capacity(stem.len());
    let mut prev_alpha = false;
    for c in stem.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                title.extend(c.to_lowercase());
            } else {
                title.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            title.push(c);
            prev_alpha = false;
        }
    }
    title
}
