//! Log output for the binary.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber.
///
/// Console output goes to stderr, filtered by `RUST_LOG` when set, else by
/// the verbosity flags (warnings by default). Independently, everything at
/// info and above is appended to `log_file` when it can be opened, so that
/// recovery and install steps leave a trace even without a console.
pub fn init(verbose: bool, quiet: bool, log_file: Option<&Path>) {
    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            EnvFilter::new("off")
        } else if verbose {
            EnvFilter::new("warn,monolith_updater=debug,monolith=debug")
        } else {
            EnvFilter::new("warn")
        }
    });

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_filter(console_filter);

    let file = log_file
        .and_then(|path| OpenOptions::new().create(true).append(true).open(path).ok())
        .map(|file| {
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::INFO)
        });

    let _ = tracing_subscriber::registry().with(console).with(file).try_init();
}
