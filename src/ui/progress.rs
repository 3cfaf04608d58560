//! Transfer progress display with CI fallback
//!
//! Transfers run on a blocking thread and write into a shared
//! `TransferState`; the display polls it from the async side.

use super::context::UiContext;
use crate::transfer::{format_bytes, TransferSnapshot, TransferState};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress bar for one upload or download
pub struct TransferProgress {
    bar: Option<ProgressBar>,
    sized: bool,
}

impl TransferProgress {
    /// Shows an indicatif bar in interactive mode, one plain line otherwise
    pub fn new(ctx: &UiContext, label: &str) -> Self {
        let bar = if ctx.use_fancy_output() {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.cyan} {prefix}  {bytes:.dim}  {elapsed:.dim}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.set_prefix(label.to_string());
            bar.enable_steady_tick(Duration::from_millis(120));
            Some(bar)
        } else {
            eprintln!("{}...", label);
            None
        };
        Self { bar, sized: false }
    }

    pub fn update(&mut self, snapshot: &TransferSnapshot) {
        let Some(ref bar) = self.bar else { return };

        if let (Some(total), false) = (snapshot.total_bytes, self.sized) {
            // Switch from spinner to bar once listing has produced a total
            bar.set_style(
                ProgressStyle::with_template(
                    "  {spinner:.cyan} {prefix}  {bar:30.cyan/dim} {bytes}/{total_bytes} {binary_bytes_per_sec:.dim} {eta:.dim}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("━╸─"),
            );
            bar.set_length(total);
            self.sized = true;
        }
        bar.set_position(snapshot.bytes_transferred);
        if snapshot.status.is_terminal() {
            // Bytes are done; the caller may still be loading them
            bar.disable_steady_tick();
        }
    }

    pub fn finish(&self) {
        if let Some(ref bar) = self.bar {
            bar.disable_steady_tick();
            bar.finish_and_clear();
        }
    }
}

/// One-line description of a finished transfer, e.g. `1.5 MB in 2.3s`
pub fn summary(snapshot: &TransferSnapshot) -> String {
    format!(
        "{} in {:.1}s",
        format_bytes(snapshot.bytes_transferred),
        snapshot.elapsed.as_secs_f64()
    )
}

/// Display progress of `state` until `task` finishes, then return its result
pub async fn track<T>(
    ctx: &UiContext,
    label: &str,
    state: Arc<TransferState>,
    mut task: JoinHandle<T>,
) -> Result<T, JoinError> {
    let mut progress = TransferProgress::new(ctx, label);
    let result = loop {
        tokio::select! {
            result = &mut task => break result,
            _ = tokio::time::sleep(POLL_INTERVAL) => progress.update(&state.snapshot()),
        }
    };
    progress.update(&state.snapshot());
    progress.finish();
    result
}
