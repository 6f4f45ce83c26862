//! Terminal progress bars.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Mutex;
use sync_client::{ProgressCallback, ProgressEvent};

/// Progress callback using indicatif progress bars.
///
/// One bar for the current file and one for the whole run. Bars draw to
/// stderr and hide themselves when it is not a terminal.
pub struct IndicatifCallback {
    mp: MultiProgress,
    state: Mutex<IndicatifState>,
}

#[derive(Default)]
struct IndicatifState {
    overall_pb: Option<ProgressBar>,
    file_pb: Option<ProgressBar>,
    /// Bytes of files already finished (or given up on).
    finished_bytes: u64,
    files_done: usize,
    files_total: usize,
}

impl IndicatifCallback {
    /// Create a new indicatif callback.
    pub fn new() -> Self {
        Self {
            mp: MultiProgress::new(),
            state: Mutex::new(IndicatifState::default()),
        }
    }

    fn file_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn overall_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-")
    }

    fn finish_file(&self, state: &mut IndicatifState, size: u64, message: &'static str) {
        if let Some(pb) = state.file_pb.take() {
            pb.finish_with_message(message);
        }
        state.finished_bytes += size;
        state.files_done += 1;
        if let Some(ref pb) = state.overall_pb {
            pb.set_position(state.finished_bytes);
            pb.set_message(format!("{}/{} files", state.files_done, state.files_total));
            if state.files_done == state.files_total {
                pb.finish_with_message("complete");
            }
        }
    }
}

impl Default for IndicatifCallback {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressCallback for IndicatifCallback {
    fn on_progress(&self, event: ProgressEvent) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        match event {
            ProgressEvent::PlanReady {
                to_transfer,
                total_bytes,
                ..
            } => {
                state.files_total = to_transfer;
                if to_transfer > 1 {
                    let pb = self.mp.add(ProgressBar::new(total_bytes));
                    pb.set_style(Self::overall_style());
                    pb.set_message(format!("0/{} files", to_transfer));
                    state.overall_pb = Some(pb);
                }
            }
            ProgressEvent::FileStarted { key, total_bytes } => {
                let pb = self.mp.add(ProgressBar::new(total_bytes));
                pb.set_style(Self::file_style());
                pb.set_message(key);
                state.file_pb = Some(pb);
            }
            ProgressEvent::FileProgress {
                bytes_transferred, ..
            } => {
                if let Some(ref pb) = state.file_pb {
                    pb.set_position(bytes_transferred);
                }
                if let Some(ref pb) = state.overall_pb {
                    pb.set_position(state.finished_bytes + bytes_transferred);
                }
            }
            ProgressEvent::FileCompleted { bytes, .. } => {
                self.finish_file(&mut state, bytes, "done");
            }
            ProgressEvent::FileFailed { key, error } => {
                let size = state.file_pb.as_ref().and_then(|pb| pb.length()).unwrap_or(0);
                self.finish_file(&mut state, size, "failed");
                let _ = self.mp.println(format!("Error: {} - {}", key, error));
            }
            ProgressEvent::Deleted { key, side } => {
                let _ = self.mp.println(format!("Deleted {} ({})", key, side));
            }
            ProgressEvent::DeleteFailed { key, side, error } => {
                let _ = self
                    .mp
                    .println(format!("Error: could not delete {} ({}) - {}", key, side, error));
            }
        }
    }
}
