//! Per-item outcomes and run reports.
//!
//! Executors never let a single file's failure escape: every item becomes an
//! outcome value that is folded into a [`BatchReport`].

use std::fmt;
use sync_types::{DatasetId, Direction};

/// A single item that could not be processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Path key of the item.
    pub key: String,
    /// Human-readable reason.
    pub error: String,
}

impl ItemFailure {
    /// Create a failure record from any displayable error.
    pub fn new(key: impl Into<String>, error: impl fmt::Display) -> Self {
        Self {
            key: key.into(),
            error: error.to_string(),
        }
    }
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.key, self.error)
    }
}

/// Result of transferring one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The file was copied.
    Transferred {
        /// Path key of the file.
        key: String,
        /// Bytes moved.
        bytes: u64,
    },
    /// The file could not be copied; the batch continued.
    Failed(ItemFailure),
}

/// Result of deleting one orphan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// The orphan was removed.
    Deleted {
        /// Path key of the file.
        key: String,
    },
    /// The orphan could not be removed; the batch continued.
    Failed(ItemFailure),
}

/// Accumulated outcomes of one batch (transfers or deletions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Keys processed successfully, in processing order.
    pub completed: Vec<String>,
    /// Items that failed, in processing order.
    pub failed: Vec<ItemFailure>,
    /// Bytes moved by successful transfers.
    pub bytes: u64,
}

impl BatchReport {
    /// Create an empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a transfer outcome into the report.
    pub fn record_transfer(&mut self, outcome: TransferOutcome) {
        match outcome {
            TransferOutcome::Transferred { key, bytes } => {
                self.completed.push(key);
                self.bytes += bytes;
            }
            TransferOutcome::Failed(failure) => self.failed.push(failure),
        }
    }

    /// Fold a deletion outcome into the report.
    pub fn record_deletion(&mut self, outcome: DeletionOutcome) {
        match outcome {
            DeletionOutcome::Deleted { key } => self.completed.push(key),
            DeletionOutcome::Failed(failure) => self.failed.push(failure),
        }
    }

    /// Number of items attempted.
    pub fn attempted(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    /// Check if every attempted item succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Dataset that was reconciled.
    pub dataset: DatasetId,
    /// Direction of the run.
    pub direction: Direction,
    /// Number of files already in agreement.
    pub synchronized: usize,
    /// Transfer outcomes.
    pub transfers: BatchReport,
    /// Deletion outcomes, `None` when deletion was not requested.
    pub deletions: Option<BatchReport>,
    /// Orphans left in place because deletion was not requested.
    pub orphans_kept: usize,
}

impl SyncReport {
    /// Total number of failed items across both batches.
    pub fn failure_count(&self) -> usize {
        self.transfers.failed.len() + self.deletions.as_ref().map_or(0, |d| d.failed.len())
    }

    /// Check if any item failed.
    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}
