//! Reconciliation engine.
//!
//! One run is: list the remote once, scan the local tree, plan, transfer,
//! then (optionally) delete orphans. The plan is a snapshot of both sides
//! taken before any transfer starts.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sync_core::{BatchReport, ReconciliationPlan, RemoteIndex, SyncReport};
use sync_types::{DatasetId, Direction, Version};
use thiserror::Error;
use tracing::info;

use crate::executor::Executor;
use crate::interrupt::Interrupt;
use crate::progress::{NoOpCallback, ProgressCallback, ProgressEvent};
use crate::remote::{Remote, RemoteError};
use crate::scan::{scan_local, ScanError};

/// Errors that end a run.
///
/// Per-file failures never show up here; they are recorded in the
/// [`SyncReport`]. A run stopped during its transfers or deletions carries
/// the report of what finished before it stopped.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The user cancelled the run.
    #[error("interrupted")]
    Interrupted {
        /// Work finished before the interrupt.
        partial: Option<Box<SyncReport>>,
    },

    /// The remote listing could not be fetched.
    #[error("cannot list {dataset}: {source}")]
    Listing {
        /// Dataset being listed.
        dataset: DatasetId,
        /// Underlying error.
        #[source]
        source: RemoteError,
    },

    /// The local tree could not be scanned.
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The download root could not be created.
    #[error("cannot create {path}: {source}")]
    CreateRoot {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The service refused a request the run cannot continue without.
    #[error("request to the dataset service failed")]
    Remote {
        /// Underlying error.
        source: RemoteError,
        /// Work finished before the failure.
        partial: Option<Box<SyncReport>>,
    },
}

impl EngineError {
    pub(crate) fn interrupted() -> Self {
        EngineError::Interrupted { partial: None }
    }

    pub(crate) fn remote(source: RemoteError) -> Self {
        EngineError::Remote {
            source,
            partial: None,
        }
    }

    /// Check if the run was cancelled by the user.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, EngineError::Interrupted { .. })
    }

    /// What the run finished before it stopped, if it got that far.
    pub fn partial(&self) -> Option<&SyncReport> {
        match self {
            EngineError::Interrupted { partial } | EngineError::Remote { partial, .. } => {
                partial.as_deref()
            }
            _ => None,
        }
    }

    fn with_partial(mut self, report: SyncReport) -> Self {
        if let EngineError::Interrupted { partial } | EngineError::Remote { partial, .. } =
            &mut self
        {
            *partial = Some(Box::new(report));
        }
        self
    }
}

/// Drives reconciliation runs against one remote.
pub struct SyncEngine<R: Remote + ?Sized> {
    remote: Arc<R>,
    progress: Arc<dyn ProgressCallback>,
    interrupt: Interrupt,
}

impl<R: Remote + ?Sized> SyncEngine<R> {
    /// Create an engine with no progress reporting.
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

    /// The remote this engine talks to.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// The interrupt this engine obeys.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Run `work` unless the interrupt fires first.
    async fn interruptible<T>(
        &self,
        work: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        tokio::select! {
            biased;
            _ = self.interrupt.triggered() => Err(EngineError::interrupted()),
            result = work => result,
        }
    }

    /// Create a new, empty dataset.
    ///
    /// Nothing is sent once the interrupt has fired.
    pub async fn create_dataset(&self) -> Result<DatasetId, EngineError> {
        let dataset = self
            .interruptible(async { self.remote.create_dataset().await.map_err(EngineError::remote) })
            .await?;
        info!(%dataset, "created dataset");
        Ok(dataset)
    }

    /// Fetch the remote listing once and index it.
    pub async fn index(
        &self,
        dataset: &DatasetId,
        version: Option<&Version>,
    ) -> Result<RemoteIndex, EngineError> {
        let files = self
            .remote
            .list_files(dataset, version)
            .await
            .map_err(|source| EngineError::Listing {
                dataset: dataset.clone(),
                source,
            })?;
        let index = RemoteIndex::from_listing(dataset.clone(), version.cloned(), files);
        info!(%dataset, files = index.len(), bytes = index.total_bytes(), "fetched remote listing");
        Ok(index)
    }

    /// Compute the plan for one run without changing anything.
    ///
    /// A download root that does not exist yet is treated as empty. The
    /// listing and the scan are abandoned as soon as the interrupt fires.
    pub async fn plan(
        &self,
        root: &Path,
        dataset: &DatasetId,
        version: Option<&Version>,
        direction: Direction,
    ) -> Result<ReconciliationPlan, EngineError> {
        let index = self.interruptible(self.index(dataset, version)).await?;
        let local = if direction == Direction::Download && !root.exists() {
            Vec::new()
        } else {
            self.interruptible(async { scan_local(root).await.map_err(EngineError::from) })
                .await?
        };
        let plan = sync_core::plan(local, &index, direction);
        info!(
            %direction,
            transfer = plan.to_transfer.len(),
            synchronized = plan.already_synchronized.len(),
            orphaned = plan.orphaned.len(),
            "planned"
        );
        Ok(plan)
    }

    /// Make the dataset's draft match the local tree.
    ///
    /// With `delete`, remote files missing locally are removed after all
    /// transfers.
    pub async fn upload(
        &self,
        root: &Path,
        dataset: &DatasetId,
        delete: bool,
    ) -> Result<SyncReport, EngineError> {
        let plan = self.plan(root, dataset, None, Direction::Upload).await?;
        self.execute(root, dataset, plan, delete).await
    }

    /// Make the local tree match a dataset snapshot (`None` = draft).
    ///
    /// The root is created if missing. With `delete`, local files missing
    /// remotely are removed after all transfers.
    pub async fn download(
        &self,
        root: &Path,
        dataset: &DatasetId,
        version: Option<&Version>,
        delete: bool,
    ) -> Result<SyncReport, EngineError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| EngineError::CreateRoot {
                path: root.to_path_buf(),
                source,
            })?;
        let plan = self.plan(root, dataset, version, Direction::Download).await?;
        self.execute(root, dataset, plan, delete).await
    }

    /// Carry out a plan: transfers first, then orphan deletion if asked.
    pub async fn execute(
        &self,
        root: &Path,
        dataset: &DatasetId,
        plan: ReconciliationPlan,
        delete: bool,
    ) -> Result<SyncReport, EngineError> {
        self.progress.on_progress(ProgressEvent::PlanReady {
            direction: plan.direction,
            to_transfer: plan.to_transfer.len(),
            total_bytes: plan.transfer_bytes(),
            synchronized: plan.already_synchronized.len(),
            orphaned: plan.orphaned.len(),
        });

        let executor = Executor::new(Arc::clone(&self.remote))
            .with_progress(Arc::clone(&self.progress))
            .with_interrupt(self.interrupt.clone());

        let mut report = SyncReport {
            dataset: dataset.clone(),
            direction: plan.direction,
            synchronized: plan.already_synchronized.len(),
            transfers: BatchReport::new(),
            deletions: None,
            orphans_kept: plan.orphaned.len(),
        };

        let result = executor
            .run_transfers(dataset, root, plan.to_transfer, &mut report.transfers)
            .await;
        if let Err(e) = result {
            return Err(e.with_partial(report));
        }

        if delete {
            let mut deletions = BatchReport::new();
            let result = executor
                .run_deletions(dataset, root, plan.orphaned, &mut deletions)
                .await;
            report.orphans_kept -= deletions.attempted();
            report.deletions = Some(deletions);
            if let Err(e) = result {
                return Err(e.with_partial(report));
            }
        }

        info!(
            %dataset,
            direction = %report.direction,
            transferred = report.transfers.completed.len(),
            failed = report.failure_count(),
            "run finished"
        );
        Ok(report)
    }
}
