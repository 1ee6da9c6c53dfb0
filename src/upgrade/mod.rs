//! Self-update pipeline for the Monolith executable.
//!
//! Checks for a newer release, downloads and verifies the asset for this
//! platform, and replaces the running executable so that an interruption at
//! any point (crash, power loss, denied permission) leaves either the old or
//! the new executable in place, never neither.
//!
//! # Update Process Flow
//!
//! ```text
//! 0. Crash recovery (every startup, before anything else)
//!    └── lock present? restore backup, remove lock
//!
//! 1. Version gate
//!    ├── Fetch plain-text latest version
//!    └── Continue only if strictly newer (or --force)
//!
//! 2. Asset resolution
//!    ├── Fetch release JSON
//!    └── Pick <prefix>-<os>.<ext>
//!
//! 3. Download
//!    ├── Stream to update_temp_<asset>, up to 3 attempts
//!    └── Verify SHA-256 (never retried on mismatch)
//!
//! 4. Atomic install
//!    ├── Create update.lock
//!    ├── Rename executable to <exe>.old
//!    ├── Extract into update_extract/
//!    ├── Probe write access, move new executable into place
//!    └── Remove update.lock (commit); keep <exe>.old
//!
//! 5. Restart
//!    ├── Relaunch, or
//!    └── Re-run elevated to finish the swap (Windows)
//! ```
//!
//! Any failure in step 4 restores the backup before the lock is removed. A
//! permission failure is the exception: the install halts with lock and
//! backup kept so that an elevated process can [resume] it.
//!
//! # Module Structure
//!
//! - [`version`]: version parsing and ordering
//! - [`release`]: release descriptor decoding
//! - [`asset`]: platform to asset-name mapping
//! - [`transport`]: network seam and the HTTP implementation
//! - [`download`]: retrying download with progress and verification
//! - [`verification`]: SHA-256 of files
//! - [`lock`], [`backup`], [`extract`], [`installer`]: the install state machine
//! - [`recovery`]: startup crash recovery
//! - [`restart`]: relaunch and elevation
//! - [`self_updater`]: the orchestrator
//! - [`version_check`]: cached startup notifications
//! - [`config`]: update settings
//!
//! [resume]: installer::AtomicInstaller::resume

pub mod asset;
/// Moving the executable aside and back.
pub mod backup;
/// Settings for update behavior.
pub mod config;
pub mod download;
pub mod extract;
pub mod installer;
pub mod lock;
pub mod recovery;
pub mod release;
pub mod restart;
pub mod self_updater;
pub mod transport;
/// Download verification and integrity checking.
pub mod verification;
pub mod version;
/// Version checking with a persisted cache.
pub mod version_check;


pub use installer::{AtomicInstaller, InstallOutcome, InstallState};
pub use recovery::{RecoveryOutcome, recover_interrupted_install};
pub use self_updater::{PendingUpdate, SelfUpdater, UpdateOutcome};
pub use verification::ChecksumVerifier;
pub use version_check::VersionChecker;
