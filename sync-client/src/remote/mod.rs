//! Remote dataset service abstraction.
//!
//! This module provides the contract the engine needs from the dataset
//! service (list, upload, delete, publish, download) and two
//! implementations: [`HttpRemote`] for the real service and [`MockRemote`]
//! for tests.
//!
//! # Design
//!
//! The trait is async and stateless per call. A run shares one client
//! (token and connection pool) read-only across all items; no method
//! mutates authentication state.
//!
//! # Example
//!
//! ```ignore
//! let remote = MockRemote::new();
//! let dataset = remote.create_dataset().await?;
//! remote.upload_file(&dataset, Box::new(&b"hi"[..]), 2, "README").await?;
//! let files = remote.list_files(&dataset, None).await?;
//! ```

mod http;
mod mock;

pub use http::HttpRemote;
pub use mock::MockRemote;

use async_trait::async_trait;
use sync_types::{DatasetId, IdError, ListedFile, Version};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

/// Owned byte source for uploads.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Errors returned by the dataset service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Credentials missing, expired or insufficient.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The dataset, snapshot or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The service answered with an unexpected HTTP status.
    #[error("unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Request URL.
        url: String,
    },

    /// The request could not be sent or the response not received.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The service answered with something we could not interpret.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The service returned an invalid dataset id.
    #[error("invalid dataset id from server: {0}")]
    InvalidId(#[from] IdError),

    /// Reading the upload source or writing the download destination failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Check if this is an authentication failure, which ends the run.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Protocol(err.to_string())
        } else {
            RemoteError::Connection(err.to_string())
        }
    }
}

/// Dataset service operations used by the engine.
#[async_trait]
pub trait Remote: Send + Sync {
    /// Create a new, empty draft dataset.
    async fn create_dataset(&self) -> Result<DatasetId, RemoteError>;

    /// List every file of a dataset snapshot (`None` = draft) in one call.
    async fn list_files(
        &self,
        dataset: &DatasetId,
        version: Option<&Version>,
    ) -> Result<Vec<ListedFile>, RemoteError>;

    /// Upload `size` bytes from `body` to `path` in the dataset's draft.
    async fn upload_file(
        &self,
        dataset: &DatasetId,
        body: ByteReader,
        size: u64,
        path: &str,
    ) -> Result<(), RemoteError>;

    /// Delete `path` from the dataset's draft.
    async fn delete_file(&self, dataset: &DatasetId, path: &str) -> Result<(), RemoteError>;

    /// Publish the dataset.
    async fn publish_dataset(&self, dataset: &DatasetId) -> Result<(), RemoteError>;

    /// Stream the content behind `url` into `destination`.
    ///
    /// Returns the number of bytes written.
    async fn download(
        &self,
        url: &str,
        destination: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, RemoteError>;
}
