//! # sync-client
//!
//! Client library for openneuro-sync.
//!
//! This is the I/O half of the reconciliation engine: it talks to the
//! dataset service, walks the local tree and moves bytes.
//!
//! ## Features
//!
//! - **Remote Abstraction**: [`Remote`] trait with an HTTP implementation and a mock
//! - **Progress Streams**: [`ProgressStream`] reports byte positions of any reader/writer
//! - **Failure Isolation**: one failed file never aborts the batch
//! - **Interruptible**: an [`Interrupt`] stops the batch promptly
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sync_client::{ClientConfig, HttpRemote, SyncEngine};
//!
//! let remote = HttpRemote::new(ClientConfig::default())?;
//! let engine = SyncEngine::new(Arc::new(remote));
//!
//! let report = engine.download(&root, &dataset, None, false).await?;
//! println!("{} files downloaded", report.transfers.completed.len());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod executor;
pub mod interrupt;
pub mod progress;
pub mod remote;
pub mod scan;

pub use config::{ClientConfig, DEFAULT_SERVER};
pub use engine::{EngineError, SyncEngine};
pub use executor::Executor;
pub use interrupt::Interrupt;
pub use progress::{callback, NoOpCallback, ProgressCallback, ProgressEvent, ProgressStream};
pub use remote::{ByteReader, HttpRemote, MockRemote, Remote, RemoteError};
pub use scan::{scan_local, ScanError};
