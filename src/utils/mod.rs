//! Terminal helpers for the command-line interface.

pub mod progress;

pub use progress::DownloadProgressBar;
