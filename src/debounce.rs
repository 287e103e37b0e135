//! Debounced keyword channel.
//!
//! Splits the raw keystroke value (updates synchronously, never triggers a
//! fetch) from the committed keyword (forwarded only after an uninterrupted
//! quiet period). The pending commit is an owned task handle, so a newer
//! keystroke or teardown cancels it outright; no commit can fire after drop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Quiet period used by the product search box.
pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(500);

pub struct KeywordDebouncer {
    raw: String,
    quiet: Duration,
    tx: mpsc::UnboundedSender<String>,
    pending: Option<JoinHandle<()>>,
}

impl KeywordDebouncer {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self::with_quiet_period(tx, DEFAULT_QUIET_PERIOD)
    }

    pub fn with_quiet_period(tx: mpsc::UnboundedSender<String>, quiet: Duration) -> Self {
        Self {
            raw: String::new(),
            quiet,
            tx,
            pending: None,
        }
    }

    /// The live input-box value.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Record a keystroke: restart the quiet-period timer for the new value.
    ///
    /// Clearing the input commits immediately so the product fetch can switch
    /// back to the list-all path without waiting out the quiet period.
    pub fn submit(&mut self, raw: impl Into<String>) {
        let raw = raw.into();
        self.raw = raw.clone();
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }

        let committed = raw.trim().to_string();
        if committed.is_empty() {
            let _ = self.tx.send(committed);
            return;
        }

        let tx = self.tx.clone();
        let quiet = self.quiet;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(quiet).await;
            debug!(keyword = %committed, "keyword committed");
            let _ = tx.send(committed);
        }));
    }
}

impl Drop for KeywordDebouncer {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.abort();
        }
    }
}
