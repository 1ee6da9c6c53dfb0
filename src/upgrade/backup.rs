//! Parking the current executable beside itself during an install.
//!
//! The backup lives at `<exe>.old`. While the install lock exists it is the
//! rollback source; once an install commits it only serves a manual
//! rollback and is discarded by the next install before that one takes the
//! lock.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterPaths;
use crate::constants::RESTORE_ATTEMPTS;
use crate::core::{Result, UpdateError};

/// Moves the current executable aside before an install and back on rollback.
///
/// The backup is a rename, not a copy: after [`create_backup`] the install
/// path is empty and the previous binary lives only at the backup path. On
/// every platform the supported targets ship on, renaming a running
/// executable is allowed, so the current process keeps running from the
/// moved image.
///
/// After a successful install the backup is left on disk; it is the source
/// for a later manual rollback.
///
/// [`create_backup`]: BackupManager::create_backup
///
/// # Examples
///
/// ```rust,no_run
/// use monolith_updater::upgrade::backup::BackupManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> monolith_updater::core::Result<()> {
/// let manager = BackupManager::new(
///     PathBuf::from("/opt/monolith/monolith"),
///     PathBuf::from("/opt/monolith/monolith.old"),
/// );
///
/// manager.create_backup().await?;
/// // ... install fails ...
/// manager.restore_backup().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackupManager {
    /// Path to the executable.
    original_path: PathBuf,
    /// Path where the previous executable is parked.
    backup_path: PathBuf,
}

impl BackupManager {
    /// Manager for an explicit executable and backup location.
    pub fn new(original_path: PathBuf, backup_path: PathBuf) -> Self {
        Self {
            original_path,
            backup_path,
        }
    }

    /// Manager for the install and backup paths of `paths`.
    pub fn for_paths(paths: &UpdaterPaths) -> Self {
        Self::new(paths.install_path().to_path_buf(), paths.backup_path())
    }

    /// Rename the executable to the backup path.
    ///
    /// A stale backup from an earlier attempt is deleted first. Fails with
    /// [`UpdateError::BackupFailed`]; in that case the executable has not
    /// moved.
    pub async fn create_backup(&self) -> Result<()> {
        let failed = |reason: String| UpdateError::BackupFailed {
            path: self.original_path.clone(),
            reason,
        };

        if !fs::try_exists(&self.original_path).await.unwrap_or(false) {
            return Err(failed("executable does not exist".to_string()));
        }

        if fs::try_exists(&self.backup_path).await.unwrap_or(false) {
            debug!("Removing old backup at {:?}", self.backup_path);
            fs::remove_file(&self.backup_path)
                .await
                .map_err(|e| failed(format!("failed to remove old backup: {e}")))?;
        }

        info!("Moving {:?} to backup {:?}", self.original_path, self.backup_path);
        fs::rename(&self.original_path, &self.backup_path)
            .await
            .map_err(|e| failed(e.to_string()))?;

        Ok(())
    }

    /// Delete a backup left by an earlier, committed install.
    ///
    /// Must only be called while no install lock exists; under a lock the
    /// backup is the rollback source. Fails with [`UpdateError::BackupFailed`].
    pub async fn discard_backup(&self) -> Result<()> {
        match fs::remove_file(&self.backup_path).await {
            Ok(()) => {
                debug!("Discarded previous backup {:?}", self.backup_path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::BackupFailed {
                path: self.original_path.clone(),
                reason: format!("failed to remove old backup: {e}"),
            }),
        }
    }

    /// Rename the backup over the executable path.
    ///
    /// Whatever occupies the executable path (a half-written new binary, or
    /// nothing) is replaced. Fails with [`UpdateError::RollbackFailed`],
    /// which names the backup so it can be restored by hand.
    pub async fn restore_backup(&self) -> Result<()> {
        if !self.backup_exists().await {
            return Err(self.rollback_failed("no backup found".to_string()));
        }

        warn!("Restoring from backup at {:?}", self.backup_path);
        self.attempt_restore().await.map_err(|e| {
            let err = self.rollback_failed(e.to_string());
            error!("{}", err);
            err
        })?;

        info!("Successfully restored from backup");
        Ok(())
    }

    /// [`restore_backup`](Self::restore_backup) with a few retries.
    ///
    /// Used for manual rollbacks, where the executable may still be held
    /// open briefly by a process that is shutting down.
    pub async fn restore_backup_with_retry(&self) -> Result<()> {
        let mut attempts = 0;

        loop {
            match self.restore_backup().await {
                Ok(()) => return Ok(()),
                Err(e) if attempts < RESTORE_ATTEMPTS - 1 && self.backup_exists().await => {
                    warn!("Restore attempt {} failed: {}. Retrying...", attempts + 1, e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    attempts += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt_restore(&self) -> std::io::Result<()> {
        match fs::rename(&self.backup_path, &self.original_path).await {
            Ok(()) => Ok(()),
            // Windows refuses to rename onto some existing files; clear the path first.
            Err(e) if e.kind() != ErrorKind::NotFound && self.original_path.exists() => {
                debug!("Direct restore failed ({}), removing {:?} first", e, self.original_path);
                fs::remove_file(&self.original_path).await?;
                fs::rename(&self.backup_path, &self.original_path).await
            }
            Err(e) => Err(e),
        }
    }

    fn rollback_failed(&self, reason: String) -> UpdateError {
        UpdateError::RollbackFailed {
            backup: self.backup_path.clone(),
            path: self.original_path.clone(),
            reason,
        }
    }

    /// Whether a backup is present.
    pub async fn backup_exists(&self) -> bool {
        fs::try_exists(&self.backup_path).await.unwrap_or(false)
    }

    /// Location of the backup.
    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Location of the executable.
    pub fn original_path(&self) -> &Path {
        &self.original_path
    }
}
