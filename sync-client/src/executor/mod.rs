//! Transfer and deletion executors.
//!
//! Items are processed one at a time. A failing item becomes a
//! `Failed` outcome and the batch moves on; only an interrupt or an
//! authentication failure ends the batch early.
//!
//! The interrupt is checked before each item and raced against the item in
//! flight, so a long download is abandoned as soon as it fires.

mod delete;
mod transfer;

use std::path::Path;
use std::sync::Arc;

use sync_core::{BatchReport, Orphan, TransferItem};
use sync_types::{DatasetId, PathError};
use thiserror::Error;

use crate::engine::EngineError;
use crate::interrupt::Interrupt;
use crate::progress::{NoOpCallback, ProgressCallback, ProgressEvent};
use crate::remote::{Remote, RemoteError};

/// Why a single item failed.
#[derive(Debug, Error)]
enum ItemError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("refusing to write outside the target directory: {0}")]
    Path(#[from] PathError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no download URL listed")]
    NoUrl,

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },
}

impl ItemError {
    /// Split fatal errors from ones the batch survives.
    fn into_item_failure(self) -> Result<Self, EngineError> {
        match self {
            ItemError::Remote(e) if e.is_unauthorized() => Err(EngineError::remote(e)),
            other => Ok(other),
        }
    }
}

/// Runs plan items against the local tree and a [`Remote`].
pub struct Executor<R: Remote + ?Sized> {
    remote: Arc<R>,
    progress: Arc<dyn ProgressCallback>,
    interrupt: Interrupt,
}

impl<R: Remote + ?Sized> Executor<R> {
    /// Create an executor with no progress reporting and a fresh interrupt.
    pub fn new(remote: Arc<R>) -> Self {
        Self {
            remote,
            progress: Arc::new(NoOpCallback),
            interrupt: Interrupt::new(),
        }
    }

    /// Set the progress callback.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Share an interrupt token.
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The interrupt this executor obeys.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.on_progress(event);
    }

    /// Transfer every item in order, recording outcomes into `report`.
    ///
    /// Returns [`EngineError::Interrupted`] as soon as the interrupt fires.
    /// Items finished before a fatal error stay recorded in `report`.
    pub async fn run_transfers(
        &self,
        dataset: &DatasetId,
        root: &Path,
        items: Vec<TransferItem>,
        report: &mut BatchReport,
    ) -> Result<(), EngineError> {
        for item in &items {
            if self.interrupt.is_triggered() {
                return Err(EngineError::interrupted());
            }
            let outcome = tokio::select! {
                biased;
                _ = self.interrupt.triggered() => return Err(EngineError::interrupted()),
                outcome = self.transfer(dataset, root, item) => outcome?,
            };
            report.record_transfer(outcome);
        }
        Ok(())
    }

    /// Delete every orphan at most once, recording outcomes into `report`.
    ///
    /// Returns [`EngineError::Interrupted`] as soon as the interrupt fires.
    pub async fn run_deletions(
        &self,
        dataset: &DatasetId,
        root: &Path,
        orphans: Vec<Orphan>,
        report: &mut BatchReport,
    ) -> Result<(), EngineError> {
        for orphan in &orphans {
            if self.interrupt.is_triggered() {
                return Err(EngineError::interrupted());
            }
            let outcome = tokio::select! {
                biased;
                _ = self.interrupt.triggered() => return Err(EngineError::interrupted()),
                outcome = self.delete(dataset, root, orphan) => outcome?,
            };
            report.record_deletion(outcome);
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use crate::progress::{callback, ProgressCallback, ProgressEvent};

    /// Callback that records every event.
    pub fn recorder() -> (Arc<dyn ProgressCallback>, Arc<Mutex<Vec<ProgressEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let cb = callback(move |event| sink.lock().unwrap().push(event));
        (cb, events)
    }
}
