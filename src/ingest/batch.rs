use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::realtime::RealtimeUploader;
use crate::core::errors::PlatformError;

/// Pause between uploads in a batch so the realtime endpoint is not flooded.
pub const BATCH_PAUSE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: Vec<(PathBuf, String)>,
}

/// Supported files directly inside `dir` (not recursive), sorted by name.
pub fn supported_files(dir: &Path) -> Result<Vec<PathBuf>, PlatformError> {
    if !dir.is_dir() {
        return Err(PlatformError::Ingestion(format!(
            "not a directory: {}",
            dir.display()
        )));
    }
    let entries = std::fs::read_dir(dir).map_err(|e| {
        PlatformError::Ingestion(format!("failed to list {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && RealtimeUploader::is_supported(p))
        .collect();
    files.sort();
    Ok(files)
}

/// Uploads every supported file in `dir` one at a time, waiting `pause`
/// between uploads. A failed file is recorded and the batch moves on;
/// cancellation stops it before the next file.
pub async fn batch_upload(
    dir: &Path,
    uploader: &RealtimeUploader,
    pause: Duration,
    cancel: &CancellationToken,
) -> Result<BatchReport, PlatformError> {
    let files = supported_files(dir)?;
    tracing::info!("Found {} files to ingest in {}", files.len(), dir.display());

    let mut report = BatchReport::default();
    for (i, path) in files.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(PlatformError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
        match uploader.process_file(path, cancel).await {
            Ok(_) => report.processed += 1,
            Err(PlatformError::Cancelled) => return Err(PlatformError::Cancelled),
            Err(err) => {
                tracing::warn!("Failed to ingest {}: {}", path.display(), err);
                report.failed.push((path.clone(), err.to_string()));
            }
        }
    }

    tracing::info!(
        "Batch complete: {} processed, {} failed",
        report.processed,
        report.failed.len()
    );
    Ok(report)
}
