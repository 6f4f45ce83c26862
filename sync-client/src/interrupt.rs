//! User cancellation.
//!
//! An interrupt is not an item failure: once triggered, executors stop
//! scheduling new items and abandon the one in flight. Clones share state.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared cancellation token for one run.
#[derive(Debug, Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    /// Create an untriggered token.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Trigger the interrupt. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Check if the interrupt has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the interrupt is triggered.
    ///
    /// Returns immediately if it already was.
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Trigger this interrupt on Ctrl-C.
    ///
    /// Spawns a background task on the current tokio runtime.
    pub fn trigger_on_ctrl_c(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, stopping after cleanup");
                interrupt.trigger();
            }
        });
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}
