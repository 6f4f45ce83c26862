//! # sync-types
//!
//! Shared types for openneuro-sync.
//!
//! This crate provides the foundational types used across all openneuro-sync crates:
//! - [`DatasetId`], [`Version`] - Dataset identity
//! - [`LocalEntry`], [`RemoteEntry`], [`ListedFile`] - One file on either side of a reconciliation
//! - [`Direction`], [`Side`] - Which side is authoritative for a run
//! - [`path`] - Conversion between local paths and remote path keys
//! - [`PathError`], [`IdError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod entry;
mod error;
mod ids;
pub mod path;

pub use entry::{Direction, ListedFile, LocalEntry, RemoteEntry, Side};
pub use error::{IdError, PathError};
pub use ids::{DatasetId, Version};
