use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::realtime::RealtimeUploader;
use crate::core::errors::PlatformError;

/// Time given to the writer of a new file before it is read.
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Watches `dir` recursively and uploads every new `.txt`/`.md` file on its
/// own task until `cancel` fires. Upload failures are logged and skipped.
pub async fn watch_directory(
    dir: PathBuf,
    uploader: Arc<RealtimeUploader>,
    cancel: CancellationToken,
) -> Result<(), PlatformError> {
    if !dir.exists() {
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            PlatformError::Ingestion(format!("failed to create {}: {}", dir.display(), e))
        })?;
        tracing::info!("Created watch directory {}", dir.display());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })
    .map_err(|e| PlatformError::Ingestion(format!("failed to start watcher: {}", e)))?;
    watcher
        .watch(&dir, RecursiveMode::Recursive)
        .map_err(|e| PlatformError::Ingestion(format!("failed to watch {}: {}", dir.display(), e)))?;

    tracing::info!("Watching {} for new .txt/.md files", dir.display());

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Some(Ok(event)) => {
                for path in created_files(&event) {
                    spawn_upload(path, uploader.clone(), cancel.clone());
                }
            }
            Some(Err(err)) => tracing::warn!("Watch error: {}", err),
            None => break,
        }
    }

    tracing::info!("Stopped watching {}", dir.display());
    Ok(())
}

fn created_files(event: &Event) -> Vec<PathBuf> {
    if !matches!(event.kind, EventKind::Create(_)) {
        return Vec::new();
    }
    event
        .paths
        .iter()
        .filter(|p| !p.is_dir() && RealtimeUploader::is_supported(p))
        .cloned()
        .collect()
}

fn spawn_upload(path: PathBuf, uploader: Arc<RealtimeUploader>, cancel: CancellationToken) {
    tracing::info!("New file detected: {}", path.display());
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(SETTLE_DELAY) => {}
        }
        match uploader.process_file(&path, &cancel).await {
            Ok(message) => tracing::info!("Ingested {}: {}", path.display(), message),
            Err(err) => tracing::warn!("Failed to ingest {}: {}", path.display(), err),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockConfig, MockPlatform};
    use notify::event::{CreateKind, ModifyKind};
    use std::sync::atomic::Ordering;

    #[test]
    fn only_created_supported_files_are_picked() {
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/tmp/in/a.md"))
            .add_path(PathBuf::from("/tmp/in/b.pdf"));
        assert_eq!(created_files(&event), vec![PathBuf::from("/tmp/in/a.md")]);

        let modified = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(PathBuf::from("/tmp/in/a.md"));
        assert!(created_files(&modified).is_empty());
    }

    #[tokio::test]
    async fn creates_missing_directory_and_stops_on_cancel() {
        let mock = MockPlatform::start(MockConfig::default()).await;
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("inbox");
        let uploader = Arc::new(
            RealtimeUploader::new(reqwest::Client::new(), mock.broker(), &mock.settings()).unwrap(),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        watch_directory(dir.clone(), uploader, cancel).await.unwrap();
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn new_file_is_uploaded() {
        let mock = MockPlatform::start(MockConfig::default()).await;
        let dir = tempfile::tempdir().unwrap();
        let uploader = Arc::new(
            RealtimeUploader::new(reqwest::Client::new(), mock.broker(), &mock.settings()).unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watch_directory(
            dir.path().to_path_buf(),
            uploader,
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(300)).await;

        std::fs::write(dir.path().join("weekly_update.txt"), "Status is green.").unwrap();

        let mut uploaded = false;
        for _ in 0..50 {
            if mock.recorded.ingest_calls.load(Ordering::SeqCst) > 0 {
                uploaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        cancel.cancel();
        let _ = handle.await;

        assert!(uploaded);
        let body = mock.recorded.ingest_bodies.lock().unwrap()[0].clone();
        assert_eq!(body["item_title"], "Weekly Update");
    }
}
