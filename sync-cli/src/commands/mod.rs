//! CLI command implementations.

pub mod download;
pub mod login;
pub mod publish;
pub mod upload;

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result};
use sync_core::{ReconciliationPlan, SyncReport};
use sync_types::Direction;
use tokio::sync::oneshot;

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Everything that was attempted succeeded.
    Complete,
    /// Some files failed; the rest went through.
    Partial,
}

impl Completion {
    /// Process exit code for this completion.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Completion::Complete => ExitCode::SUCCESS,
            Completion::Partial => ExitCode::from(2),
        }
    }
}

impl From<&SyncReport> for Completion {
    fn from(report: &SyncReport) -> Self {
        if report.has_failures() {
            Completion::Partial
        } else {
            Completion::Complete
        }
    }
}

/// Ask a yes/no question on the terminal. Anything but `y`/`yes` is no.
///
/// The answer is read on a plain thread, so dropping the returned future
/// abandons the prompt without holding up runtime shutdown.
pub async fn confirm(question: String) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush().context("Failed to write prompt")?;

    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut answer = String::new();
        let _ = tx.send(std::io::stdin().read_line(&mut answer).map(|_| answer));
    });
    let answer = rx
        .await
        .context("Prompt closed")?
        .context("Failed to read answer")?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Print what a run would do.
pub fn print_plan(plan: &ReconciliationPlan, delete: bool) {
    let verb = match plan.direction {
        Direction::Upload => "upload",
        Direction::Download => "download",
    };

    println!(
        "{} file(s) to {} ({} bytes), {} already up to date",
        plan.to_transfer.len(),
        verb,
        plan.transfer_bytes(),
        plan.already_synchronized.len()
    );
    for item in &plan.to_transfer {
        println!("  {} {} ({} bytes)", verb, item.key(), item.size());
    }

    if !plan.orphaned.is_empty() {
        let side = plan.orphan_side();
        if delete {
            println!("{} file(s) to delete on the {} side", plan.orphaned.len(), side);
        } else {
            println!(
                "{} file(s) only on the {} side (use --delete to remove)",
                plan.orphaned.len(),
                side
            );
        }
        for orphan in &plan.orphaned {
            println!("  {} {}", if delete { "delete" } else { "keep" }, orphan.key());
        }
    }
}

/// Print the summary of a finished run.
pub fn print_report(report: &SyncReport) {
    println!();
    println!(
        "{}: {} file(s) transferred ({} bytes), {} already up to date",
        report.dataset,
        report.transfers.completed.len(),
        report.transfers.bytes,
        report.synchronized
    );

    if let Some(deletions) = &report.deletions {
        println!("  {} orphan(s) deleted", deletions.completed.len());
    } else if report.orphans_kept > 0 {
        println!(
            "  {} orphan(s) kept (use --delete to remove)",
            report.orphans_kept
        );
    }

    let failures: Vec<_> = report
        .transfers
        .failed
        .iter()
        .chain(report.deletions.iter().flat_map(|d| d.failed.iter()))
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{} item(s) failed:", failures.len());
        for failure in failures {
            println!("  {}", failure);
        }
        println!("Re-run the command to retry them.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_yes_confirms() {
        assert!(is_yes("y\n"));
        assert!(is_yes(" YES \n"));
        assert!(!is_yes("\n"));
        assert!(!is_yes("n\n"));
        assert!(!is_yes("yep\n"));
    }

    #[test]
    fn report_with_failures_is_partial() {
        let mut transfers = sync_core::BatchReport::new();
        transfers.record_transfer(sync_core::TransferOutcome::Failed(sync_core::ItemFailure::new(
            "a", "boom",
        )));
        let report = SyncReport {
            dataset: sync_types::DatasetId::new("ds000001").unwrap(),
            direction: Direction::Upload,
            synchronized: 0,
            transfers,
            deletions: None,
            orphans_kept: 0,
        };
        assert_eq!(Completion::from(&report), Completion::Partial);
    }
}
