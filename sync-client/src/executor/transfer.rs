//! Single-file transfers.

use std::path::Path;
use std::sync::Arc;

use sync_core::{ItemFailure, TransferItem, TransferOutcome};
use sync_types::path::resolve_under;
use sync_types::{DatasetId, LocalEntry, RemoteEntry};
use tempfile::NamedTempFile;
use tokio::fs::{self, File};
use tracing::{debug, warn};

use super::{Executor, ItemError};
use crate::engine::EngineError;
use crate::progress::{ProgressCallback, ProgressEvent, ProgressStream};
use crate::remote::Remote;

/// Hidden temp file next to a download's destination.
///
/// Downloads are written here and renamed over the destination once
/// complete. The file is removed when dropped without being persisted.
fn staging_file(dir: &Path) -> std::io::Result<NamedTempFile> {
    let mut builder = tempfile::Builder::new();
    builder.prefix(".openneuro-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Same mode as a plain create (umask applies), not 0600.
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }
    builder.tempfile_in(dir)
}

/// Progress closure for one file.
fn file_progress(
    progress: &Arc<dyn ProgressCallback>,
    key: &str,
    total_bytes: u64,
) -> impl FnMut(u64) + Send + Unpin + 'static {
    let progress = Arc::clone(progress);
    let key = key.to_string();
    move |position| {
        progress.on_progress(ProgressEvent::FileProgress {
            key: key.clone(),
            bytes_transferred: position,
            total_bytes,
        })
    }
}

impl<R: Remote + ?Sized> Executor<R> {
    /// Transfer one item.
    ///
    /// Ordinary failures come back as [`TransferOutcome::Failed`]; only an
    /// authentication failure is returned as an error.
    pub async fn transfer(
        &self,
        dataset: &DatasetId,
        root: &Path,
        item: &TransferItem,
    ) -> Result<TransferOutcome, EngineError> {
        let key = item.key().to_string();
        self.emit(ProgressEvent::FileStarted {
            key: key.clone(),
            total_bytes: item.size(),
        });

        let result = match item {
            TransferItem::Upload(entry) => self.upload(dataset, entry).await,
            TransferItem::Download(entry) => self.download(root, entry).await,
        };

        match result {
            Ok(bytes) => {
                debug!(%key, bytes, "transferred");
                self.emit(ProgressEvent::FileCompleted {
                    key: key.clone(),
                    bytes,
                });
                Ok(TransferOutcome::Transferred { key, bytes })
            }
            Err(e) => {
                let e = e.into_item_failure()?;
                warn!(%key, error = %e, "transfer failed");
                self.emit(ProgressEvent::FileFailed {
                    key: key.clone(),
                    error: e.to_string(),
                });
                Ok(TransferOutcome::Failed(ItemFailure::new(key, e)))
            }
        }
    }

    async fn upload(&self, dataset: &DatasetId, entry: &LocalEntry) -> Result<u64, ItemError> {
        let file = File::open(&entry.absolute_path).await?;
        // Declare what is on disk now, not what the scan saw.
        let size = file.metadata().await?.len();

        let body = ProgressStream::new(file, file_progress(&self.progress, &entry.key, size));
        self.remote
            .upload_file(dataset, Box::new(body), size, &entry.key)
            .await?;
        Ok(size)
    }

    async fn download(&self, root: &Path, entry: &RemoteEntry) -> Result<u64, ItemError> {
        let destination = resolve_under(root, &entry.key)?;
        let url = entry.urls.first().ok_or(ItemError::NoUrl)?;

        let dir = destination.parent().unwrap_or(root);
        fs::create_dir_all(dir).await?;

        let (file, staged) = staging_file(dir)?.into_parts();
        let mut sink = ProgressStream::new(
            File::from_std(file),
            file_progress(&self.progress, &entry.key, entry.size),
        );

        let written = self.remote.download(url, &mut sink).await?;
        drop(sink);

        if written != entry.size {
            return Err(ItemError::SizeMismatch {
                expected: entry.size,
                actual: written,
            });
        }
        staged
            .persist(&destination)
            .map_err(|e| ItemError::Io(e.error))?;
        debug!(path = %destination.display(), "download in place");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::recorder;
    use crate::interrupt::Interrupt;
    use crate::progress::callback;
    use crate::remote::MockRemote;
    use sync_core::BatchReport;
    use sync_types::ListedFile;
    use tempfile::tempdir;

    fn ds() -> DatasetId {
        DatasetId::new("ds000001").unwrap()
    }

    fn remote_entry(key: &str, size: u64) -> RemoteEntry {
        RemoteEntry {
            key: key.to_string(),
            listed_name: key.to_string(),
            size,
            urls: vec![format!("mock://ds000001/{key}")],
            dataset: ds(),
            version: None,
        }
    }

    fn local_entry(root: &Path, key: &str, content: &[u8]) -> LocalEntry {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        LocalEntry {
            key: key.to_string(),
            absolute_path: path,
            size: content.len() as u64,
        }
    }

    // ========================================================================
    // Uploads
    // ========================================================================

    #[tokio::test]
    async fn upload_reports_progress_and_completes() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        let dataset = remote.create_dataset().await.unwrap();
        let (cb, events) = recorder();
        let executor = Executor::new(Arc::clone(&remote)).with_progress(cb);

        let item = TransferItem::Upload(local_entry(dir.path(), "sub-01/a.txt", b"hello"));
        let outcome = executor.transfer(&dataset, dir.path(), &item).await.unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::Transferred {
                key: "sub-01/a.txt".into(),
                bytes: 5
            }
        );
        assert_eq!(remote.file(&dataset, "sub-01/a.txt").unwrap(), b"hello");

        let events = events.lock().unwrap();
        assert!(matches!(events.first(), Some(ProgressEvent::FileStarted { .. })));
        assert!(events.iter().any(|e| matches!(
            e,
            ProgressEvent::FileProgress { bytes_transferred: 5, total_bytes: 5, .. }
        )));
        assert!(matches!(events.last(), Some(ProgressEvent::FileCompleted { bytes: 5, .. })));
    }

    #[tokio::test]
    async fn three_uploads_middle_fails_batch_continues() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        let dataset = remote.create_dataset().await.unwrap();
        remote.fail_upload("2.txt", "server hiccup");
        let executor = Executor::new(Arc::clone(&remote));

        let items = ["1.txt", "2.txt", "3.txt"]
            .iter()
            .map(|k| TransferItem::Upload(local_entry(dir.path(), k, b"x")))
            .collect();
        let mut report = BatchReport::new();
        executor
            .run_transfers(&dataset, dir.path(), items, &mut report)
            .await
            .unwrap();

        assert_eq!(report.completed, vec!["1.txt", "3.txt"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "2.txt");
        assert!(report.failed[0].error.contains("server hiccup"));
        assert_eq!(remote.uploads(), vec!["1.txt", "3.txt"]);
    }

    #[tokio::test]
    async fn missing_local_file_is_an_item_failure() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        let dataset = remote.create_dataset().await.unwrap();
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Upload(LocalEntry {
            key: "gone".into(),
            absolute_path: dir.path().join("gone"),
            size: 1,
        });
        let outcome = executor.transfer(&dataset, dir.path(), &item).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn unauthorized_upload_aborts_batch() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        let dataset = remote.create_dataset().await.unwrap();
        remote.deny_writes();
        let executor = Executor::new(Arc::clone(&remote));

        let items = vec![
            TransferItem::Upload(local_entry(dir.path(), "a", b"1")),
            TransferItem::Upload(local_entry(dir.path(), "b", b"2")),
        ];
        let mut report = BatchReport::new();
        let result = executor
            .run_transfers(&dataset, dir.path(), items, &mut report)
            .await;
        assert!(matches!(result, Err(EngineError::Remote { ref source, .. }) if source.is_unauthorized()));
        assert_eq!(report.attempted(), 0);
    }

    // ========================================================================
    // Downloads
    // ========================================================================

    #[tokio::test]
    async fn download_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "sub-01/anat/T1w.nii.gz", b"brain");
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(remote_entry("sub-01/anat/T1w.nii.gz", 5));
        let outcome = executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Transferred { bytes: 5, .. }));
        let written = std::fs::read(dir.path().join("sub-01/anat/T1w.nii.gz")).unwrap();
        assert_eq!(written, b"brain");
    }

    #[tokio::test]
    async fn zero_byte_download_creates_empty_file() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "empty", b"");
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(remote_entry("empty", 0));
        let outcome = executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Transferred { bytes: 0, .. }));
        assert_eq!(std::fs::metadata(dir.path().join("empty")).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn traversal_key_is_rejected_without_writing() {
        let parent = tempdir().unwrap();
        let root = parent.path().join("root");
        std::fs::create_dir(&root).unwrap();

        let remote = Arc::new(MockRemote::new());
        remote.insert_raw(
            &ds(),
            ListedFile {
                filename: "../../etc/passwd".into(),
                size: 4,
                urls: vec!["mock://raw/passwd".into()],
            },
            b"evil",
        );
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(RemoteEntry {
            key: "../../etc/passwd".into(),
            listed_name: "../../etc/passwd".into(),
            size: 4,
            urls: vec!["mock://raw/passwd".into()],
            dataset: ds(),
            version: None,
        });
        let outcome = executor.transfer(&ds(), &root, &item).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Failed(_)));
        assert!(remote.downloads().is_empty());
        assert_eq!(std::fs::read_dir(parent.path()).unwrap().count(), 1);
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_download_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "big.bin", b"0123456789");
        remote.fail_download("big.bin");
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(remote_entry("big.bin", 10));
        let outcome = executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Failed(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn failed_download_keeps_existing_copy() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"old").unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", b"0123456789");
        remote.fail_download("a");
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(remote_entry("a", 10));
        let outcome = executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        assert!(matches!(outcome, TransferOutcome::Failed(_)));
        assert_eq!(std::fs::read(dir.path().join("a")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn download_replaces_existing_copy() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a"), b"old").unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", b"newer");
        let executor = Executor::new(Arc::clone(&remote));

        let item = TransferItem::Download(remote_entry("a", 5));
        executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("a")).unwrap(), b"newer");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn short_download_is_a_size_mismatch() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", b"abc");
        let executor = Executor::new(Arc::clone(&remote));

        std::fs::write(dir.path().join("a"), b"old").unwrap();

        let item = TransferItem::Download(remote_entry("a", 99));
        let outcome = executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        match outcome {
            TransferOutcome::Failed(failure) => assert!(failure.error.contains("size mismatch")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(std::fs::read(dir.path().join("a")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn download_progress_is_monotonic() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", &[7u8; 1000]);
        let (cb, events) = recorder();
        let executor = Executor::new(Arc::clone(&remote)).with_progress(cb);

        let item = TransferItem::Download(remote_entry("a", 1000));
        executor.transfer(&ds(), dir.path(), &item).await.unwrap();

        let positions: Vec<u64> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileProgress { bytes_transferred, .. } => Some(*bytes_transferred),
                _ => None,
            })
            .collect();
        assert!(!positions.is_empty());
        assert!(positions.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*positions.last().unwrap(), 1000);
    }

    // ========================================================================
    // Interrupts
    // ========================================================================

    #[tokio::test]
    async fn interrupt_stops_remaining_items() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        for key in ["1", "2", "3"] {
            remote.insert_file(&ds(), key, b"x");
        }

        let interrupt = Interrupt::new();
        let trip = interrupt.clone();
        let cb = callback(move |event| {
            if let ProgressEvent::FileCompleted { key, .. } = event {
                if key == "2" {
                    trip.trigger();
                }
            }
        });
        let executor = Executor::new(Arc::clone(&remote))
            .with_progress(cb)
            .with_interrupt(interrupt);

        let items = ["1", "2", "3"]
            .iter()
            .map(|k| TransferItem::Download(remote_entry(k, 1)))
            .collect();
        let mut report = BatchReport::new();
        let result = executor
            .run_transfers(&ds(), dir.path(), items, &mut report)
            .await;

        assert!(matches!(result, Err(EngineError::Interrupted { .. })));
        assert_eq!(report.completed, vec!["1", "2"]);
        assert!(dir.path().join("2").exists());
        assert!(!dir.path().join("3").exists());
        assert_eq!(remote.downloads().len(), 2);
    }

    #[tokio::test]
    async fn interrupt_abandons_in_flight_download_and_keeps_old_copy() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "slow.bin", b"0123456789");
        remote.stall_download("slow.bin");
        std::fs::write(dir.path().join("slow.bin"), b"old").unwrap();

        let interrupt = Interrupt::new();
        let trip = interrupt.clone();
        let cb = callback(move |event| {
            if let ProgressEvent::FileProgress { .. } = event {
                trip.trigger();
            }
        });
        let executor = Executor::new(Arc::clone(&remote))
            .with_progress(cb)
            .with_interrupt(interrupt);

        let items = vec![TransferItem::Download(remote_entry("slow.bin", 10))];
        let result = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            executor.run_transfers(&ds(), dir.path(), items, &mut BatchReport::new()),
        )
        .await
        .expect("interrupt should end the batch");

        assert!(matches!(result, Err(EngineError::Interrupted { .. })));
        assert_eq!(std::fs::read(dir.path().join("slow.bin")).unwrap(), b"old");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn already_interrupted_does_nothing() {
        let dir = tempdir().unwrap();
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", b"x");
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let executor = Executor::new(Arc::clone(&remote)).with_interrupt(interrupt);

        let items = vec![TransferItem::Download(remote_entry("a", 1))];
        let result = executor
            .run_transfers(&ds(), dir.path(), items, &mut BatchReport::new())
            .await;

        assert!(matches!(result, Err(EngineError::Interrupted { .. })));
        assert!(remote.downloads().is_empty());
    }
}
