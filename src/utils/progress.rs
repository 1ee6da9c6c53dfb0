//! Terminal progress display for downloads.
//!
//! Progress output is suppressed when `MONOLITH_NO_PROGRESS` is set (to any
//! value) or when stderr is not a terminal, so logs and CI output stay clean.

use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;

use crate::constants::NO_PROGRESS_ENV;
use crate::upgrade::download::DownloadProgress;

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some() || !std::io::stderr().is_terminal()
}

/// Byte-level progress bar fed by [`DownloadProgress`] updates.
///
/// Starts as a spinner and switches to a bar once the total size is known.
#[derive(Clone)]
pub struct DownloadProgressBar {
    inner: ProgressBar,
}

impl DownloadProgressBar {
    /// A bar labelled with `asset_name`.
    ///
    /// Hidden when `enabled` is false or progress is disabled for the
    /// environment.
    pub fn new(asset_name: &str, enabled: bool) -> Self {
        let inner = if !enabled || is_progress_disabled() {
            ProgressBar::hidden()
        } else {
            let bar = ProgressBar::new_spinner();
            bar.set_style(spinner_style());
            bar
        };
        inner.set_prefix(asset_name.to_string());
        Self {
            inner,
        }
    }

    /// Apply one progress update.
    pub fn update(&self, progress: DownloadProgress) {
        if let Some(total) = progress.total {
            if self.inner.length() != Some(total) {
                self.inner.set_length(total);
                self.inner.set_style(download_style());
            }
        }
        self.inner.set_position(progress.downloaded);
    }

    /// A callback suitable for [`SelfUpdater::install`](crate::upgrade::SelfUpdater::install).
    pub fn callback(&self) -> impl Fn(DownloadProgress) + Send + Sync + 'static {
        let bar = self.clone();
        move |progress| bar.update(progress)
    }

    /// Finish and leave a final message.
    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    /// Finish and remove the bar.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }

    /// Bytes shown so far.
    pub fn position(&self) -> u64 {
        self.inner.position()
    }
}

fn download_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸━")
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{prefix:.bold} {spinner:.cyan} {bytes}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}
