//! Local directory enumeration.
//!
//! Every regular file under the root becomes one [`LocalEntry`] keyed by its
//! `/`-joined relative path. Symlinks are not followed and directories
//! produce no entries of their own.

use std::path::{Path, PathBuf};
use sync_types::path::key_under_root;
use sync_types::{LocalEntry, PathError};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Errors from scanning a local tree.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root exists but is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The root could not be inspected.
    #[error("cannot read {path}: {source}")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The walk hit an unreadable entry.
    #[error("walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file path could not be turned into a key.
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    /// The blocking scan task panicked or was cancelled.
    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Enumerate the regular files under `root`, sorted by key.
///
/// Files whose names are not valid UTF-8 cannot be represented as keys and
/// are skipped with a warning.
pub async fn scan_local(root: &Path) -> Result<Vec<LocalEntry>, ScanError> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || scan_blocking(&root)).await?
}

fn scan_blocking(root: &Path) -> Result<Vec<LocalEntry>, ScanError> {
    let metadata = std::fs::metadata(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let key = match key_under_root(root, entry.path()) {
            Ok(key) => key,
            Err(PathError::NotUtf8(_)) => {
                warn!(path = %entry.path().display(), "skipping file with non-UTF-8 name");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let size = entry.metadata()?.len();
        entries.push(LocalEntry {
            key,
            absolute_path: entry.into_path(),
            size,
        });
    }

    entries.sort_by(|a, b| a.key.cmp(&b.key));
    debug!(root = %root.display(), files = entries.len(), "scanned local tree");
    Ok(entries)
}
