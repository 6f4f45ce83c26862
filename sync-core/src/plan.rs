//! Reconciliation planner.
//!
//! Compares the local files against the remote listing and partitions every
//! key into exactly one of:
//!
//! - **to_transfer**: on the source side, and absent or a different size on
//!   the target side
//! - **already_synchronized**: on both sides with the same size
//! - **orphaned**: on the target side only; deletion candidates
//!
//! Which side is the source depends on the [`Direction`]. Orphans are always
//! on the target side, so a deletion never touches the authoritative copy.
//!
//! Size is the only identity check available: the service exposes no content
//! hashes. Two different files of equal size at the same key are considered
//! synchronized.

use std::collections::BTreeMap;
use sync_types::{Direction, LocalEntry, RemoteEntry, Side};

use crate::RemoteIndex;

/// A file that has to be copied from the source side to the target side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferItem {
    /// Local file to upload.
    Upload(LocalEntry),
    /// Remote file to download.
    Download(RemoteEntry),
}

impl TransferItem {
    /// Path key of the file.
    pub fn key(&self) -> &str {
        match self {
            TransferItem::Upload(local) => &local.key,
            TransferItem::Download(remote) => &remote.key,
        }
    }

    /// Expected size in bytes.
    pub fn size(&self) -> u64 {
        match self {
            TransferItem::Upload(local) => local.size,
            TransferItem::Download(remote) => remote.size,
        }
    }
}

/// A file present only on the target side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Orphan {
    /// Local file absent from the remote dataset.
    Local(LocalEntry),
    /// Remote file absent from the local tree.
    Remote(RemoteEntry),
}

impl Orphan {
    /// Path key of the file.
    pub fn key(&self) -> &str {
        match self {
            Orphan::Local(local) => &local.key,
            Orphan::Remote(remote) => &remote.key,
        }
    }

    /// Side the orphan lives on.
    pub fn side(&self) -> Side {
        match self {
            Orphan::Local(_) => Side::Local,
            Orphan::Remote(_) => Side::Remote,
        }
    }
}

/// The outcome of comparing both sides.
///
/// Derived per run and never persisted.
#[derive(Debug, Clone)]
pub struct ReconciliationPlan {
    /// Direction the plan was computed for.
    pub direction: Direction,
    /// Files to copy from source to target, in key order.
    pub to_transfer: Vec<TransferItem>,
    /// Keys present on both sides with equal size.
    pub already_synchronized: Vec<String>,
    /// Files only on the target side, in key order.
    pub orphaned: Vec<Orphan>,
}

impl ReconciliationPlan {
    /// Side the orphans live on (the target side).
    pub fn orphan_side(&self) -> Side {
        self.direction.target()
    }

    /// Check if nothing has to be transferred.
    pub fn is_synchronized(&self) -> bool {
        self.to_transfer.is_empty()
    }

    /// Total bytes that will be transferred.
    pub fn transfer_bytes(&self) -> u64 {
        self.to_transfer.iter().map(TransferItem::size).sum()
    }
}

trait ByteSize {
    fn byte_size(&self) -> u64;
}

impl ByteSize for LocalEntry {
    fn byte_size(&self) -> u64 {
        self.size
    }
}

impl ByteSize for RemoteEntry {
    fn byte_size(&self) -> u64 {
        self.size
    }
}

struct Partition<S, T> {
    transfer: Vec<S>,
    synchronized: Vec<String>,
    orphaned: Vec<T>,
}

/// Walk the source keys, consuming matching keys from the target working set.
///
/// A size mismatch consumes the target key too: that file is about to be
/// overwritten by the transfer, so it must not also be deleted.
fn partition<S: ByteSize, T: ByteSize>(
    source: BTreeMap<String, S>,
    mut target: BTreeMap<String, T>,
) -> Partition<S, T> {
    let mut transfer = Vec::new();
    let mut synchronized = Vec::new();

    for (key, item) in source {
        match target.remove(&key) {
            Some(existing) if existing.byte_size() == item.byte_size() => synchronized.push(key),
            _ => transfer.push(item),
        }
    }

    Partition {
        transfer,
        synchronized,
        orphaned: target.into_values().collect(),
    }
}

/// Compute the reconciliation plan for one run.
///
/// `local` is every regular file found under the local root; `remote` is the
/// listing of the dataset snapshot.
pub fn plan(local: Vec<LocalEntry>, remote: &RemoteIndex, direction: Direction) -> ReconciliationPlan {
    let local: BTreeMap<String, LocalEntry> =
        local.into_iter().map(|e| (e.key.clone(), e)).collect();
    let remote = remote.entries().clone();

    match direction {
        Direction::Upload => {
            let p = partition(local, remote);
            ReconciliationPlan {
                direction,
                to_transfer: p.transfer.into_iter().map(TransferItem::Upload).collect(),
                already_synchronized: p.synchronized,
                orphaned: p.orphaned.into_iter().map(Orphan::Remote).collect(),
            }
        }
        Direction::Download => {
            let p = partition(remote, local);
            ReconciliationPlan {
                direction,
                to_transfer: p.transfer.into_iter().map(TransferItem::Download).collect(),
                already_synchronized: p.synchronized,
                orphaned: p.orphaned.into_iter().map(Orphan::Local).collect(),
            }
        }
    }
}
