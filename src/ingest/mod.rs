//! Content ingestion: realtime text upload, whole-file upload, item metadata
//! edits, one-shot directory batches and a directory watcher feeding the
//! realtime uploader.

pub mod batch;
pub mod metadata;
pub mod realtime;
pub mod upload;
pub mod watcher;

use std::path::Path;

use crate::core::errors::PlatformError;
use crate::core::http::HttpReply;

pub use batch::{batch_upload, BatchReport, BATCH_PAUSE};
pub use metadata::{ItemMetadata, ItemRef};
pub use realtime::{title_from_path, RealtimeUploader};
pub use upload::{FileUploader, MetadataUpload, UploadReceipt};
pub use watcher::watch_directory;

const MAX_ERROR_BODY_CHARS: usize = 500;

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn ingestion_failure(operation: &str, reply: &HttpReply) -> PlatformError {
    let detail = reply
        .detail()
        .unwrap_or_else(|| reply.body.chars().take(MAX_ERROR_BODY_CHARS).collect());
    PlatformError::Ingestion(format!(
        "{} returned {}: {}",
        operation,
        reply.status.as_u16(),
        detail
    ))
}
