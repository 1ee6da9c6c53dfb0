//! Monolith updater: crash-safe self-update for the Monolith mod manager.
//!
//! The running executable replaces itself with a newer release without ever
//! leaving the install broken. An interrupted update (crash, power loss,
//! killed process) is detected on the next start and undone from a backup.
//!
//! # Architecture Overview
//!
//! - A plain-text endpoint names the latest version; a release endpoint
//!   lists the downloadable assets with optional SHA-256 digests
//! - The asset for the current platform is streamed to the configuration
//!   directory, retried on network failure and verified before use
//! - The install is a small state machine guarded by `update.lock`: the old
//!   executable is moved to `<exe>.old`, the archive is extracted to a
//!   staging directory and the new executable is moved into place
//! - The lock is removed only once the new executable is in place, so its
//!   presence at startup always means "restore the backup"
//!
//! # Core Modules
//!
//! - [`upgrade`] - the update pipeline: version gate, download, install,
//!   recovery, restart
//! - [`config`] - `config.toml` settings and filesystem locations
//! - [`core`] - error types and user-facing error rendering
//! - [`cli`] - the `monolith` command
//! - [`utils`] - terminal progress display
//!
//! # Example
//!
//! ```rust,no_run
//! use monolith_updater::config::UpdaterPaths;
//! use monolith_updater::upgrade::config::UpgradeConfig;
//! use monolith_updater::upgrade::{SelfUpdater, UpdateOutcome, recover_interrupted_install};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let paths = UpdaterPaths::discover()?;
//! recover_interrupted_install(&paths).await;
//!
//! let updater = SelfUpdater::from_config(paths, UpgradeConfig::default())?;
//! match updater.update(None).await {
//!     UpdateOutcome::Updated { version, .. } => println!("updated to {version}"),
//!     UpdateOutcome::UpToDate { .. } => println!("up to date"),
//!     other => println!("{other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
