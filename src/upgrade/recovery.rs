//! Startup recovery from an interrupted install.
//!
//! Must run before anything else touches the executable or starts an
//! update. A lock sentinel on disk means the previous run stopped between
//! taking the lock and committing; whatever the reason, the previous
//! executable is put back and the lock is cleared.

use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::config::UpdaterPaths;
use crate::upgrade::backup::BackupManager;
use crate::upgrade::extract;
use crate::upgrade::lock::InstallLock;

/// What recovery found and did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// No lock; nothing to do.
    Clean,
    /// The backup was moved back over the executable.
    Restored {
        /// Backup that was restored
        backup: PathBuf,
    },
    /// A lock without a backup was removed.
    LockCleared,
    /// The backup could not be restored. The lock is gone, the backup is
    /// still on disk.
    Failed {
        /// Why the restore failed
        reason: String,
    },
}

/// Undo an interrupted install, if there is one.
///
/// Never fails: problems are logged and reported in the outcome. Running it
/// twice in a row is equivalent to running it once.
pub async fn recover_interrupted_install(paths: &UpdaterPaths) -> RecoveryOutcome {
    let lock = InstallLock::new(paths.lock_path());
    if !lock.exists().await {
        return RecoveryOutcome::Clean;
    }

    warn!("Found install lock {:?}; the previous update was interrupted", lock.path());
    let backup = BackupManager::for_paths(paths);

    let outcome = if backup.backup_exists().await {
        match backup.restore_backup().await {
            Ok(()) => {
                info!("Restored previous executable from {:?}", backup.backup_path());
                RecoveryOutcome::Restored {
                    backup: backup.backup_path().to_path_buf(),
                }
            }
            Err(err) => {
                error!("Crash recovery could not restore the executable: {}", err);
                RecoveryOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    } else {
        info!("No backup present; clearing stale lock");
        RecoveryOutcome::LockCleared
    };

    if let Err(err) = lock.release().await {
        error!("Crash recovery could not remove the lock: {}", err);
    }
    if let Err(e) = extract::remove_staging(&paths.staging_dir()).await {
        warn!("Failed to remove staging directory: {}", e);
    }

    outcome
}
