//! Files on either side of a reconciliation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::{DatasetId, Version};

/// A regular file discovered by walking the local root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalEntry {
    /// Remote key of the file (relative, `/`-separated).
    pub key: String,
    /// Absolute path on the local filesystem.
    pub absolute_path: PathBuf,
    /// File size in bytes.
    pub size: u64,
}

/// One file as returned by the remote listing call.
///
/// Field names follow the service's JSON (`filename`, `size`, `urls`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedFile {
    /// Relative path of the file in the dataset, `/`-separated.
    pub filename: String,
    /// File size in bytes.
    pub size: u64,
    /// Equivalent download URLs.
    #[serde(default)]
    pub urls: Vec<String>,
}

/// A file listed by the remote service for one dataset snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Normalized remote key, used to match against local files.
    pub key: String,
    /// Filename exactly as the service listed it.
    ///
    /// Usually equal to `key`. Calls back to the service use this name so
    /// they address the file the service knows.
    pub listed_name: String,
    /// File size in bytes.
    pub size: u64,
    /// Equivalent download URLs; any one of them can be used.
    pub urls: Vec<String>,
    /// Dataset the file belongs to.
    pub dataset: DatasetId,
    /// Snapshot the listing was taken from, `None` for the draft.
    pub version: Option<Version>,
}

/// Which way files flow in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local tree is authoritative, the remote dataset is updated.
    Upload,
    /// Remote dataset is authoritative, the local tree is updated.
    Download,
}

impl Direction {
    /// The side files are read from.
    pub fn source(self) -> Side {
        match self {
            Direction::Upload => Side::Local,
            Direction::Download => Side::Remote,
        }
    }

    /// The side files are written to, and the only side deletions touch.
    pub fn target(self) -> Side {
        match self {
            Direction::Upload => Side::Remote,
            Direction::Download => Side::Local,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => f.write_str("upload"),
            Direction::Download => f.write_str("download"),
        }
    }
}

/// One side of a reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The local directory tree.
    Local,
    /// The remote dataset.
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => f.write_str("local"),
            Side::Remote => f.write_str("remote"),
        }
    }
}
