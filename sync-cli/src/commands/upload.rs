//! Upload a local directory to a dataset draft.

use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use sync_client::{scan_local, EngineError, Remote, SyncEngine};
use sync_types::{DatasetId, Direction};

use super::{print_plan, print_report, Completion};

/// Options for the upload command.
#[derive(Debug, Clone)]
pub struct UploadArgs {
    /// Target dataset; `None` creates a new one.
    pub dataset: Option<DatasetId>,
    /// Local directory to upload.
    pub path: PathBuf,
    /// Remove remote files that are not present locally.
    pub delete: bool,
    /// Create a dataset without asking.
    pub force: bool,
    /// Print the plan only.
    pub dry_run: bool,
}

/// Run the upload command.
///
/// `confirm` is asked before a new dataset is created, unless `force` is set.
/// An interrupt while it waits for an answer cancels the upload.
pub async fn run<R, F, Fut>(engine: &SyncEngine<R>, args: UploadArgs, confirm: F) -> Result<Completion>
where
    R: Remote + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let root = &args.path;
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let dataset = match args.dataset {
        Some(dataset) => dataset,
        None if args.dry_run => {
            let files = scan_local(root).await?;
            let bytes: u64 = files.iter().map(|f| f.size).sum();
            println!(
                "Would create a new dataset and upload {} file(s) ({} bytes)",
                files.len(),
                bytes
            );
            return Ok(Completion::Complete);
        }
        None => {
            if !args.force {
                let question = "No dataset given. Create a new dataset?".to_string();
                let answer = tokio::select! {
                    biased;
                    _ = engine.interrupt().triggered() => {
                        return Err(EngineError::Interrupted { partial: None }.into());
                    }
                    answer = confirm(question) => answer?,
                };
                if !answer {
                    anyhow::bail!("Upload cancelled");
                }
            }
            let dataset = engine
                .create_dataset()
                .await
                .context("Failed to create dataset")?;
            println!("Created dataset {}", dataset);
            dataset
        }
    };

    if args.dry_run {
        let plan = engine
            .plan(root, &dataset, None, Direction::Upload)
            .await?;
        print_plan(&plan, args.delete);
        return Ok(Completion::Complete);
    }

    println!("Uploading {} to {}...", root.display(), dataset);
    let report = engine
        .upload(root, &dataset, args.delete)
        .await
        .with_context(|| format!("Upload to {} failed", dataset))?;
    print_report(&report);
    Ok(Completion::from(&report))
}
