use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::metadata::{ItemMetadata, ItemRef};
use super::{has_extension, ingestion_failure};
use crate::auth::CredentialBroker;
use crate::core::config::validation::require_publisher_id;
use crate::core::config::PlatformSettings;
use crate::core::errors::PlatformError;
use crate::core::http::{self, INGEST_TIMEOUT, UPLOAD_TIMEOUT};

pub const UPLOAD_EXTENSIONS: [&str; 5] = ["txt", "md", "pdf", "doc", "docx"];

/// What the files endpoint reports for an accepted upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadReceipt {
    pub message: String,
    pub ingesting: Vec<String>,
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MetadataUpload {
    pub receipt: UploadReceipt,
    pub producer_id: String,
    /// Server message from the metadata call, when one was made.
    pub metadata_message: Option<String>,
}

/// Uploads whole files to the data engine and edits item metadata.
#[derive(Clone)]
pub struct FileUploader {
    client: Client,
    broker: Arc<CredentialBroker>,
    files_url: String,
    metadata_url: String,
    publisher_id: String,
}

impl FileUploader {
    pub fn new(
        client: Client,
        broker: Arc<CredentialBroker>,
        settings: &PlatformSettings,
    ) -> Result<Self, PlatformError> {
        let publisher_id = require_publisher_id(settings)?.to_string();
        Ok(Self {
            client,
            broker,
            files_url: settings.files_url(),
            metadata_url: settings.metadata_url(),
            publisher_id,
        })
    }

    pub fn is_supported(path: &Path) -> bool {
        has_extension(path, &UPLOAD_EXTENSIONS)
    }

    pub async fn upload_file(
        &self,
        path: &Path,
        producer_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, PlatformError> {
        if !path.is_file() {
            return Err(PlatformError::Ingestion(format!(
                "file not found: {}",
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
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let token = self.broker.ensure_valid(cancel).await?;
        let form = Form::new()
            .part("files", Part::bytes(bytes).file_name(file_name.clone()))
            .text("publisher_id", self.publisher_id.clone());
        let mut request = self
            .client
            .post(&self.files_url)
            .bearer_auth(token)
            .multipart(form);
        if let Some(producer_id) = producer_id.filter(|p| !p.is_empty()) {
            request = request.query(&[("producer_id", producer_id)]);
        }

        let reply = http::send(request, UPLOAD_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(ingestion_failure("file upload", &reply));
        }

        let receipt: UploadReceipt = reply.json()?;
        tracing::info!(
            "Uploaded {}: {} ingesting, {} duplicates",
            file_name,
            receipt.ingesting.len(),
            receipt.duplicates.len()
        );
        Ok(receipt)
    }

    pub async fn update_metadata(
        &self,
        item: &ItemRef,
        metadata: &ItemMetadata,
        cancel: &CancellationToken,
    ) -> Result<String, PlatformError> {
        let token = self.broker.ensure_valid(cancel).await?;
        let body = metadata.to_body(&self.publisher_id, item);
        let request = self
            .client
            .post(&self.metadata_url)
            .bearer_auth(token)
            .json(&body);

        let reply = http::send(request, INGEST_TIMEOUT, cancel).await?;
        if !reply.is_success() {
            return Err(ingestion_failure("metadata update", &reply));
        }

        let payload: Value = reply.json()?;
        Ok(payload
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or("Success")
            .to_string())
    }

    /// Uploads under a generated producer id, then applies `metadata` to the
    /// first ingesting item. Duplicates get no metadata call.
    pub async fn upload_with_metadata(
        &self,
        path: &Path,
        metadata: &ItemMetadata,
        cancel: &CancellationToken,
    ) -> Result<MetadataUpload, PlatformError> {
        let producer_id = format!("upload-{}", Utc::now().timestamp());
        let receipt = self.upload_file(path, Some(&producer_id), cancel).await?;

        let metadata_message = match receipt.ingesting.first() {
            Some(item_id) if !metadata.is_empty() => Some(
                self.update_metadata(&ItemRef::ItemId(item_id.clone()), metadata, cancel)
                    .await?,
            ),
            _ => None,
        };

        Ok(MetadataUpload {
            receipt,
            producer_id,
            metadata_message,
        })
    }
}
