//! Orphan deletion.

use std::path::Path;

use sync_core::{DeletionOutcome, ItemFailure, Orphan};
use sync_types::{DatasetId, LocalEntry};
use tokio::fs;
use tracing::{debug, warn};

use super::{Executor, ItemError};
use crate::engine::EngineError;
use crate::progress::ProgressEvent;
use crate::remote::Remote;

impl<R: Remote + ?Sized> Executor<R> {
    /// Delete one orphan from the side it lives on.
    ///
    /// Ordinary failures come back as [`DeletionOutcome::Failed`]; only an
    /// authentication failure is returned as an error.
    pub async fn delete(
        &self,
        dataset: &DatasetId,
        root: &Path,
        orphan: &Orphan,
    ) -> Result<DeletionOutcome, EngineError> {
        let key = orphan.key().to_string();
        let side = orphan.side();

        let result = match orphan {
            Orphan::Remote(entry) => self
                .remote
                .delete_file(dataset, &entry.listed_name)
                .await
                .map_err(ItemError::from),
            Orphan::Local(entry) => remove_local(root, entry).await,
        };

        match result {
            Ok(()) => {
                debug!(%key, %side, "deleted orphan");
                self.emit(ProgressEvent::Deleted {
                    key: key.clone(),
                    side,
                });
                Ok(DeletionOutcome::Deleted { key })
            }
            Err(e) => {
                let e = e.into_item_failure()?;
                warn!(%key, %side, error = %e, "delete failed");
                self.emit(ProgressEvent::DeleteFailed {
                    key: key.clone(),
                    side,
                    error: e.to_string(),
                });
                Ok(DeletionOutcome::Failed(ItemFailure::new(key, e)))
            }
        }
    }
}

/// Unlink a local file, then remove directories it leaves empty.
async fn remove_local(root: &Path, entry: &LocalEntry) -> Result<(), ItemError> {
    fs::remove_file(&entry.absolute_path).await?;

    let mut dir = entry.absolute_path.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        // Fails on non-empty directories, which ends the walk.
        if fs::remove_dir(current).await.is_err() {
            break;
        }
        dir = current.parent();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::test_support::recorder;
    use crate::remote::MockRemote;
    use std::sync::Arc;
    use sync_core::BatchReport;
    use sync_types::{RemoteEntry, Side};
    use tempfile::tempdir;

    fn ds() -> DatasetId {
        DatasetId::new("ds000001").unwrap()
    }

    fn local_orphan(root: &Path, key: &str) -> Orphan {
        let path = root.join(key);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();
        Orphan::Local(LocalEntry {
            key: key.to_string(),
            absolute_path: path,
            size: 1,
        })
    }

    fn remote_orphan(key: &str) -> Orphan {
        Orphan::Remote(RemoteEntry {
            key: key.to_string(),
            listed_name: key.to_string(),
            size: 1,
            urls: vec![],
            dataset: ds(),
            version: None,
        })
    }

    #[tokio::test]
    async fn local_delete_prunes_empty_directories() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub-01/func")).unwrap();
        std::fs::write(dir.path().join("sub-01/keep.txt"), b"k").unwrap();
        let orphan = local_orphan(dir.path(), "sub-01/anat/old.nii");

        let executor = Executor::new(Arc::new(MockRemote::new()));
        let outcome = executor.delete(&ds(), dir.path(), &orphan).await.unwrap();

        assert_eq!(
            outcome,
            DeletionOutcome::Deleted {
                key: "sub-01/anat/old.nii".into()
            }
        );
        assert!(!dir.path().join("sub-01/anat").exists());
        assert!(dir.path().join("sub-01/keep.txt").exists());
        assert!(dir.path().join("sub-01/func").exists());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn remote_delete_calls_service() {
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "b.txt", b"x");
        let (cb, events) = recorder();
        let executor = Executor::new(Arc::clone(&remote)).with_progress(cb);

        let dir = tempdir().unwrap();
        let outcome = executor
            .delete(&ds(), dir.path(), &remote_orphan("b.txt"))
            .await
            .unwrap();

        assert!(matches!(outcome, DeletionOutcome::Deleted { .. }));
        assert_eq!(remote.deletes(), vec!["b.txt"]);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[ProgressEvent::Deleted {
                key: "b.txt".into(),
                side: Side::Remote
            }]
        );
    }

    #[tokio::test]
    async fn failed_deletions_are_isolated() {
        let remote = Arc::new(MockRemote::new());
        for key in ["a", "b", "c"] {
            remote.insert_file(&ds(), key, b"x");
        }
        remote.fail_delete("b", "locked");
        let executor = Executor::new(Arc::clone(&remote));

        let dir = tempdir().unwrap();
        let orphans = ["a", "b", "c"].iter().map(|k| remote_orphan(k)).collect();
        let mut report = BatchReport::new();
        executor
            .run_deletions(&ds(), dir.path(), orphans, &mut report)
            .await
            .unwrap();

        assert_eq!(report.completed, vec!["a", "c"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].key, "b");
        assert_eq!(remote.keys(&ds()), vec!["b"]);
    }

    #[tokio::test]
    async fn missing_local_orphan_is_an_item_failure() {
        let dir = tempdir().unwrap();
        let executor = Executor::new(Arc::new(MockRemote::new()));
        let orphan = Orphan::Local(LocalEntry {
            key: "gone".into(),
            absolute_path: dir.path().join("gone"),
            size: 0,
        });

        let outcome = executor.delete(&ds(), dir.path(), &orphan).await.unwrap();
        assert!(matches!(outcome, DeletionOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn unauthorized_delete_is_fatal() {
        let remote = Arc::new(MockRemote::new());
        remote.insert_file(&ds(), "a", b"x");
        remote.deny_writes();
        let executor = Executor::new(Arc::clone(&remote));

        let dir = tempdir().unwrap();
        let result = executor
            .run_deletions(&ds(), dir.path(), vec![remote_orphan("a")], &mut BatchReport::new())
            .await;
        assert!(matches!(result, Err(EngineError::Remote { .. })));
    }
}
