//! # sync-core
//!
//! Pure reconciliation logic for openneuro-sync (no I/O, instant tests).
//!
//! This crate decides *what* has to happen to bring a local tree and a
//! remote dataset into agreement, without touching the network or disk:
//!
//! - [`RemoteIndex`] - the listing snapshot, keyed by path
//! - [`plan`] - three-way classification into transfer / synchronized / orphaned
//! - [`BatchReport`], [`SyncReport`] - per-item outcomes accumulated by the executors
//!
//! The actual I/O (walking the tree, HTTP, writing files) is performed by
//! `sync-client`, which feeds entries in and executes the resulting plan.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod plan;
pub mod report;

pub use index::RemoteIndex;
pub use plan::{plan, Orphan, ReconciliationPlan, TransferItem};
pub use report::{BatchReport, DeletionOutcome, ItemFailure, SyncReport, TransferOutcome};
