//! The install lock sentinel.
//!
//! The lock file's existence, not its content, means "an install is in
//! flight or was interrupted". It is created before the first destructive
//! filesystem operation and removed only after a commit or a complete
//! rollback. A process that finds it at startup must run crash recovery
//! instead of starting a fresh update, whether the holder crashed or is a
//! second live instance.
//!
//! The content is a short diagnostic line (pid and start time) for humans.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::{Result, UpdateError};

/// Handle to the lock sentinel at a fixed path.
#[derive(Debug, Clone)]
pub struct InstallLock {
    path: PathBuf,
}

impl InstallLock {
    /// Handle for the sentinel at `path`. Touches nothing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Location of the sentinel.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the sentinel is present.
    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Create the sentinel.
    ///
    /// Creation is exclusive: if the file already exists this fails with
    /// [`UpdateError::InstallInProgress`] and leaves it untouched.
    pub async fn acquire(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::fs("create lock directory", parent, &e))?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => UpdateError::InstallInProgress {
                    lock: self.path.clone(),
                },
                _ => UpdateError::fs("create install lock", &self.path, &e),
            })?;

        let note = format!("pid={} started={}\n", std::process::id(), Utc::now().to_rfc3339());
        let mut written = file.write_all(note.as_bytes()).await.map_err(|e| ("write install lock", e));
        if written.is_ok() {
            written = file.sync_all().await.map_err(|e| ("sync install lock", e));
        }
        if let Err((operation, e)) = written {
            drop(file);
            // A half-created sentinel would make the next start run recovery.
            if let Err(remove_err) = fs::remove_file(&self.path).await {
                warn!("Failed to remove unfinished lock {:?}: {}", self.path, remove_err);
            }
            return Err(UpdateError::fs(operation, &self.path, &e));
        }

        debug!("Acquired install lock {:?}", self.path);
        Ok(())
    }

    /// Remove the sentinel. Removing an absent sentinel succeeds.
    pub async fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Released install lock {:?}", self.path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::fs("remove install lock", &self.path, &e)),
        }
    }
}
