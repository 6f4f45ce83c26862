//! Download a dataset snapshot into a local directory.

use anyhow::{Context, Result};
use std::path::PathBuf;
use sync_client::{Remote, SyncEngine};
use sync_types::{DatasetId, Direction, Version};

use super::{print_plan, print_report, Completion};

/// Options for the download command.
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    /// Dataset to download.
    pub dataset: DatasetId,
    /// Snapshot tag; `None` downloads the draft.
    pub version: Option<Version>,
    /// Local directory to download into.
    pub path: PathBuf,
    /// Remove local files that are not in the snapshot.
    pub delete: bool,
    /// Print the plan only.
    pub dry_run: bool,
}

/// Run the download command.
pub async fn run<R>(engine: &SyncEngine<R>, args: DownloadArgs) -> Result<Completion>
where
    R: Remote + ?Sized,
{
    let DownloadArgs {
        dataset,
        version,
        path,
        delete,
        dry_run,
    } = args;
    let label = match &version {
        Some(v) => format!("{} {}", dataset, v),
        None => format!("{} (draft)", dataset),
    };

    if dry_run {
        let plan = engine
            .plan(&path, &dataset, version.as_ref(), Direction::Download)
            .await?;
        print_plan(&plan, delete);
        return Ok(Completion::Complete);
    }

    println!("Downloading {} to {}...", label, path.display());
    let report = engine
        .download(&path, &dataset, version.as_ref(), delete)
        .await
        .with_context(|| format!("Download of {} failed", label))?;
    print_report(&report);
    Ok(Completion::from(&report))
}
