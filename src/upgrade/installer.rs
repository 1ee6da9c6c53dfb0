//! The crash-safe install state machine.
//!
//! ```text
//! Idle -> LockAcquired -> BackedUp -> Extracted -> Swapped -> Committed
//!                            ^            |           |
//!                            |            +-----------+--> RolledBack -> Idle
//!                            +-- halts here when the install path needs elevation
//! ```
//!
//! The on-disk lock and backup are the durable record of progress; the
//! [`InstallState`] kept here mirrors them for a single run and is logged at
//! every transition. The lock exists before the backup is created and is
//! removed only after a commit or a complete rollback, which is what lets
//! [`recovery`](crate::upgrade::recovery) undo a run killed at any point.

use std::ffi::OsStr;
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterPaths;
use crate::core::{Result, UpdateError};
use crate::upgrade::backup::BackupManager;
use crate::upgrade::extract::{self, ArchiveKind};
use crate::upgrade::lock::InstallLock;

/// In-memory mirror of the install's on-disk state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// No lock, original executable in place.
    Idle,
    /// Lock sentinel created.
    LockAcquired,
    /// Executable renamed to the backup path.
    BackedUp,
    /// Archive unpacked into staging.
    Extracted,
    /// New executable moved into place.
    Swapped,
    /// Lock removed; the update is permanent.
    Committed,
    /// Backup restored after a failure.
    RolledBack,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::LockAcquired => "lock-acquired",
            Self::BackedUp => "backed-up",
            Self::Extracted => "extracted",
            Self::Swapped => "swapped",
            Self::Committed => "committed",
            Self::RolledBack => "rolled-back",
        };
        f.write_str(name)
    }
}

/// Successful result of an install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The new executable is in place.
    Committed {
        /// Path of the replaced executable
        install_path: PathBuf,
    },
    /// The asset is a disk image the user installs by hand. Nothing was touched.
    ManualInstall {
        /// Downloaded image
        image: PathBuf,
    },
}

/// Checks that the install location is writable before the swap.
pub trait PermissionProbe: Send + Sync {
    /// Succeed when a file can be created and removed at `probe_path`.
    fn check(&self, probe_path: &Path) -> std::io::Result<()>;
}

/// Probes by creating and deleting a zero-byte file.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileProbe;

impl PermissionProbe for FileProbe {
    fn check(&self, probe_path: &Path) -> std::io::Result<()> {
        std::fs::File::create(probe_path)?;
        std::fs::remove_file(probe_path)
    }
}

/// Replaces the executable at [`UpdaterPaths::install_path`] with the one
/// inside a downloaded archive.
///
/// One installer drives one attempt. Callers must serialize attempts within
/// a process; across processes the lock sentinel rejects a second attempt
/// with [`UpdateError::InstallInProgress`].
pub struct AtomicInstaller<'p> {
    paths: &'p UpdaterPaths,
    lock: InstallLock,
    backup: BackupManager,
    probe: Arc<dyn PermissionProbe>,
    state: InstallState,
}

impl<'p> AtomicInstaller<'p> {
    /// Installer for `paths`, probing permissions with [`FileProbe`].
    pub fn new(paths: &'p UpdaterPaths) -> Self {
        Self {
            paths,
            lock: InstallLock::new(paths.lock_path()),
            backup: BackupManager::for_paths(paths),
            probe: Arc::new(FileProbe),
            state: InstallState::Idle,
        }
    }

    /// Replace the permission probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn PermissionProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Current state.
    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Install the executable from `archive`, whose format follows from
    /// `asset_name`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::InstallInProgress`] if a lock already exists
    /// - [`UpdateError::BackupFailed`]; nothing was changed
    /// - [`UpdateError::ExtractionFailed`], [`UpdateError::BinaryNotFound`],
    ///   [`UpdateError::SwapFailed`]; the backup was restored
    /// - [`UpdateError::PermissionElevationRequired`]; the lock and backup
    ///   are kept for an elevated [`resume`](Self::resume)
    /// - [`UpdateError::RollbackFailed`]; the lock and backup are kept for
    ///   recovery
    pub async fn install(&mut self, archive: &Path, asset_name: &str) -> Result<InstallOutcome> {
        let kind = archive_kind(archive, asset_name)?;
        if kind == ArchiveKind::DiskImage {
            info!("{} is a disk image; leaving the install to the user", asset_name);
            return Ok(InstallOutcome::ManualInstall {
                image: archive.to_path_buf(),
            });
        }

        if self.lock.exists().await {
            return Err(UpdateError::InstallInProgress {
                lock: self.lock.path().to_path_buf(),
            });
        }
        // A backup from the last committed install must be gone before the
        // lock appears, or recovery would restore it over the current build.
        self.backup.discard_backup().await?;
        self.lock.acquire().await?;
        self.transition(InstallState::LockAcquired);

        self.back_up().await?;
        self.complete(archive, kind).await
    }

    /// Continue an install that stopped in `BackedUp`, typically in an
    /// elevated process started after [`UpdateError::PermissionElevationRequired`].
    ///
    /// A missing lock or backup is recreated, so resuming after recovery
    /// already ran behaves like a fresh install.
    pub async fn resume(&mut self, archive: &Path, asset_name: &str) -> Result<InstallOutcome> {
        let kind = archive_kind(archive, asset_name)?;

        if !self.lock.exists().await {
            if fs::try_exists(self.paths.install_path()).await.unwrap_or(false) {
                self.backup.discard_backup().await?;
            }
            self.lock.acquire().await?;
        }
        self.transition(InstallState::LockAcquired);

        if self.backup.backup_exists().await
            && !fs::try_exists(self.paths.install_path()).await.unwrap_or(false)
        {
            info!("Resuming install with backup at {:?}", self.backup.backup_path());
            self.transition(InstallState::BackedUp);
        } else {
            self.back_up().await?;
        }

        self.complete(archive, kind).await
    }

    async fn back_up(&mut self) -> Result<()> {
        if let Err(err) = self.backup.create_backup().await {
            self.release_lock_after_abort().await;
            self.transition(InstallState::Idle);
            return Err(err);
        }
        self.transition(InstallState::BackedUp);
        Ok(())
    }

    /// BackedUp through Committed.
    async fn complete(&mut self, archive: &Path, kind: ArchiveKind) -> Result<InstallOutcome> {
        let staging = self.paths.staging_dir();
        let install_path = self.paths.install_path().to_path_buf();

        if let Err(err) = extract::prepare_staging(&staging).await {
            return Err(self.roll_back(err).await);
        }
        if let Err(err) = extract::extract_archive(archive, kind, &staging).await {
            return Err(self.roll_back(err).await);
        }

        let preferred = install_path.file_name().unwrap_or(OsStr::new(""));
        let Some(new_binary) = extract::find_executable(&staging, preferred) else {
            let err = UpdateError::BinaryNotFound {
                archive: archive.to_path_buf(),
            };
            return Err(self.roll_back(err).await);
        };
        debug!("Found new executable at {:?}", new_binary);
        self.transition(InstallState::Extracted);

        let probe_path = self.paths.probe_path();
        if let Err(e) = self.probe.check(&probe_path) {
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(self.halt_for_elevation(&install_path));
            }
            let err = UpdateError::SwapFailed {
                path: install_path.clone(),
                reason: format!("write probe failed: {e}"),
            };
            return Err(self.roll_back(err).await);
        }

        if let Err(e) = move_into_place(&new_binary, &install_path).await {
            if e.kind() == ErrorKind::PermissionDenied {
                return Err(self.halt_for_elevation(&install_path));
            }
            let err = UpdateError::SwapFailed {
                path: install_path.clone(),
                reason: e.to_string(),
            };
            return Err(self.roll_back(err).await);
        }
        if let Err(e) = set_executable(&install_path).await {
            let err = UpdateError::SwapFailed {
                path: install_path.clone(),
                reason: format!("failed to set permissions: {e}"),
            };
            return Err(self.roll_back(err).await);
        }
        self.transition(InstallState::Swapped);

        self.commit(archive).await?;
        info!("Installed new executable at {:?}", install_path);
        Ok(InstallOutcome::Committed {
            install_path,
        })
    }

    /// Remove the lock, then the scratch files. The backup stays.
    async fn commit(&mut self, archive: &Path) -> Result<()> {
        if let Err(err) = self.lock.release().await {
            error!("Install swapped but the lock could not be removed: {}", err);
            return Err(err);
        }
        self.transition(InstallState::Committed);

        if let Err(e) = extract::remove_staging(&self.paths.staging_dir()).await {
            warn!("Failed to remove staging directory: {}", e);
        }
        match fs::remove_file(archive).await {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                warn!("Failed to remove downloaded archive {:?}: {}", archive, e);
            }
            _ => {}
        }
        Ok(())
    }

    /// Restore the backup and return the error to report.
    ///
    /// If the restore itself fails the lock is kept so the next start runs
    /// recovery, and the rollback failure replaces `cause`.
    async fn roll_back(&mut self, cause: UpdateError) -> UpdateError {
        warn!("Install failed in state {}: {}. Rolling back", self.state, cause);

        if let Err(rollback_err) = self.backup.restore_backup().await {
            error!(
                "Rollback failed; previous executable remains at {:?}",
                self.backup.backup_path()
            );
            self.transition(InstallState::BackedUp);
            return rollback_err;
        }
        self.transition(InstallState::RolledBack);

        self.release_lock_after_abort().await;
        if let Err(e) = extract::remove_staging(&self.paths.staging_dir()).await {
            warn!("Failed to remove staging directory: {}", e);
        }
        self.transition(InstallState::Idle);
        cause
    }

    fn halt_for_elevation(&mut self, install_path: &Path) -> UpdateError {
        warn!(
            "No write access to {:?}; keeping backup {:?} for an elevated retry",
            install_path,
            self.backup.backup_path()
        );
        self.transition(InstallState::BackedUp);
        UpdateError::PermissionElevationRequired {
            path: install_path.to_path_buf(),
        }
    }

    async fn release_lock_after_abort(&self) {
        if let Err(e) = self.lock.release().await {
            warn!("Failed to remove install lock: {}", e);
        }
    }

    fn transition(&mut self, next: InstallState) {
        if self.state != next {
            debug!("Install state: {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

fn archive_kind(archive: &Path, asset_name: &str) -> Result<ArchiveKind> {
    ArchiveKind::from_name(asset_name).ok_or_else(|| UpdateError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason: format!("unsupported archive format: {asset_name}"),
    })
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_into_place(src: &Path, dest: &Path) -> std::io::Result<()> {
    match fs::rename(src, dest).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(e),
        Err(e) => {
            debug!("Rename into place failed ({}), copying instead", e);
            fs::copy(src, dest).await?;
            if let Err(e) = fs::remove_file(src).await {
                debug!("Failed to remove staged copy {:?}: {}", src, e);
            }
            Ok(())
        }
    }
}

#[cfg(unix)]
async fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await
}

#[cfg(not(unix))]
async fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
