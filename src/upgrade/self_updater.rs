use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::UpdaterPaths;
use crate::core::{Result, UpdateError};
use crate::upgrade::asset::{AssetResolver, Platform};
use crate::upgrade::backup::BackupManager;
use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::download::{ProgressCallback, SecureDownloader};
use crate::upgrade::installer::{AtomicInstaller, FileProbe, InstallOutcome, PermissionProbe};
use crate::upgrade::lock::InstallLock;
use crate::upgrade::recovery::{RecoveryOutcome, recover_interrupted_install};
use crate::upgrade::release::{AssetEntry, ReleaseDescriptor};
use crate::upgrade::restart::RestartSupervisor;
use crate::upgrade::transport::{HttpTransport, Transport};
use crate::upgrade::version;

/// A release that passed the version gate, with the asset for this host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpdate {
    /// The release descriptor.
    pub release: ReleaseDescriptor,
    /// The asset selected for this platform.
    pub asset: AssetEntry,
}

impl PendingUpdate {
    /// Version being installed.
    pub fn version(&self) -> &str {
        self.release.version()
    }

    /// Release notes.
    pub fn changelog(&self) -> &str {
        &self.release.changelog
    }
}

/// Terminal result of an update attempt, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The new executable is installed; the application should restart.
    Updated {
        /// Installed version
        version: String,
        /// Path of the replaced executable
        install_path: PathBuf,
    },
    /// No newer release exists.
    UpToDate {
        /// The running version
        current: String,
    },
    /// A disk image was downloaded for the user to install.
    ManualInstall {
        /// Downloaded version
        version: String,
        /// Path of the image
        image: PathBuf,
    },
    /// The swap needs elevated privileges. The install is halted with its
    /// lock and backup in place; see [`SelfUpdater::request_elevation`].
    ElevationRequested {
        /// Version being installed
        version: String,
        /// Downloaded archive to resume from
        archive: PathBuf,
    },
    /// The update failed. Unless the error is
    /// [`UpdateError::RollbackFailed`], the previous executable is in place.
    Failed {
        /// What went wrong
        error: UpdateError,
    },
}

/// Drives the whole update pipeline: version gate, asset resolution,
/// download and verification, and the atomic install.
///
/// One updater serves one process. Attempts are serialized by an in-process
/// flag; a concurrent attempt fails immediately instead of waiting. Across
/// processes the install lock does the same job.
///
/// # Examples
///
/// ```rust,no_run
/// use monolith_updater::config::UpdaterPaths;
/// use monolith_updater::upgrade::config::UpgradeConfig;
/// use monolith_updater::upgrade::{SelfUpdater, UpdateOutcome};
///
/// # async fn example() -> monolith_updater::core::Result<()> {
/// let updater = SelfUpdater::from_config(UpdaterPaths::discover()?, UpgradeConfig::default())?;
///
/// match updater.update(None).await {
///     UpdateOutcome::Updated { version, .. } => println!("Updated to {version}"),
///     UpdateOutcome::UpToDate { current } => println!("{current} is the latest version"),
///     other => println!("{other:?}"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct SelfUpdater<T: Transport = HttpTransport> {
    transport: T,
    paths: UpdaterPaths,
    config: UpgradeConfig,
    current_version: String,
    force: bool,
    platform: Option<Platform>,
    probe: Arc<dyn PermissionProbe>,
    in_flight: AtomicBool,
}

impl SelfUpdater<HttpTransport> {
    /// Updater talking HTTP with the timeout from `config`.
    pub fn from_config(paths: UpdaterPaths, config: UpgradeConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.request_timeout())?;
        Ok(Self::new(transport, paths, config))
    }
}

impl<T: Transport> SelfUpdater<T> {
    /// Updater over an explicit transport. The running version is this
    /// crate's version.
    pub fn new(transport: T, paths: UpdaterPaths, config: UpgradeConfig) -> Self {
        Self {
            transport,
            paths,
            config,
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            force: false,
            platform: None,
            probe: Arc::new(FileProbe),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Install even when the remote version is not newer.
    #[must_use]
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Override the version the running executable reports.
    #[must_use]
    pub fn with_current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Resolve assets for `platform` instead of the host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Replace the write-permission probe used before the swap.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn PermissionProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// The running version.
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Filesystem locations used by the pipeline.
    pub fn paths(&self) -> &UpdaterPaths {
        &self.paths
    }

    /// Update settings.
    pub fn config(&self) -> &UpgradeConfig {
        &self.config
    }

    /// Fetch the latest version string from the plain-text endpoint.
    pub async fn fetch_latest_version(&self) -> Result<String> {
        let text = self.transport.get_text(&self.config.version_url).await?;
        let latest = text.trim();
        let latest = latest.strip_prefix(['v', 'V']).unwrap_or(latest);
        debug!("Latest published version: {}", latest);
        Ok(latest.to_string())
    }

    /// The latest version, if it is newer than the running one.
    ///
    /// An unparsable remote version counts as not newer.
    pub async fn check_for_update(&self) -> Result<Option<String>> {
        let latest = self.fetch_latest_version().await?;
        if version::is_update_available(&self.current_version, &latest) {
            info!("Update available: {} -> {}", self.current_version, latest);
            Ok(Some(latest))
        } else {
            debug!("{} is up to date (remote {})", self.current_version, latest);
            Ok(None)
        }
    }

    /// Fetch the latest release descriptor.
    pub async fn fetch_release(&self) -> Result<ReleaseDescriptor> {
        let json = self.transport.get_text(&self.config.release_url).await?;
        ReleaseDescriptor::from_json(&json, &self.config.release_url)
    }

    /// Run the version gate and pick the asset for this platform.
    ///
    /// Returns `Ok(None)` when no newer version is published. With
    /// [`force`](Self::force) the gate is skipped. Touches no files.
    pub async fn prepare(&self) -> Result<Option<PendingUpdate>> {
        if !self.force && self.check_for_update().await?.is_none() {
            return Ok(None);
        }

        let release = self.fetch_release().await?;
        let resolver = match self.platform {
            Some(platform) => AssetResolver::new(platform, self.config.asset_prefix.as_str()),
            None => AssetResolver::for_host(self.config.asset_prefix.as_str())?,
        };
        let asset = resolver.resolve(&release)?.clone();

        Ok(Some(PendingUpdate {
            release,
            asset,
        }))
    }

    /// Download and verify the asset, then install it.
    ///
    /// The downloaded archive is removed after a commit and after any
    /// failure except [`UpdateError::PermissionElevationRequired`], where it
    /// is needed to resume.
    pub async fn install(
        &self,
        pending: &PendingUpdate,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<InstallOutcome> {
        let dest = self.paths.temp_archive_path(&pending.asset.name);
        let expected = if self.config.verify_checksum {
            pending.asset.expected_sha256()
        } else {
            None
        };
        if self.config.verify_checksum && expected.is_none() {
            warn!("Release publishes no checksum for {}; skipping verification", pending.asset.name);
        }

        let archive = SecureDownloader::new(&self.transport)
            .with_retry(self.config.attempts(), self.config.retry_delay())
            .download(&pending.asset.url, &dest, expected, progress)
            .await?;

        let mut installer = AtomicInstaller::new(&self.paths).with_probe(Arc::clone(&self.probe));
        let result = installer.install(&archive, &pending.asset.name).await;

        match &result {
            Ok(InstallOutcome::ManualInstall {
                image,
            }) => {
                if let Err(e) = RestartSupervisor::reveal_disk_image(image) {
                    warn!("{}", e);
                }
            }
            Err(UpdateError::PermissionElevationRequired {
                ..
            })
            | Ok(InstallOutcome::Committed {
                ..
            }) => {}
            Err(_) => remove_archive(&archive).await,
        }
        result
    }

    /// Complete an install halted for elevation, from its downloaded archive.
    pub async fn resume_install(&self, archive: &Path) -> Result<InstallOutcome> {
        let asset_name = archive
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut installer = AtomicInstaller::new(&self.paths).with_probe(Arc::clone(&self.probe));
        let result = installer.resume(archive, &asset_name).await;
        if result.is_ok() {
            self.clear_version_cache().await;
        }
        result
    }

    /// Install `pending` and classify the result.
    pub async fn apply(
        &self,
        pending: &PendingUpdate,
        progress: Option<&ProgressCallback<'_>>,
    ) -> UpdateOutcome {
        let Some(_guard) = InFlight::enter(&self.in_flight) else {
            return self.already_running();
        };

        let version = pending.version().to_string();
        match self.install(pending, progress).await {
            Ok(InstallOutcome::Committed {
                install_path,
            }) => {
                self.clear_version_cache().await;
                UpdateOutcome::Updated {
                    version,
                    install_path,
                }
            }
            Ok(InstallOutcome::ManualInstall {
                image,
            }) => UpdateOutcome::ManualInstall {
                version,
                image,
            },
            Err(UpdateError::PermissionElevationRequired {
                ..
            }) => UpdateOutcome::ElevationRequested {
                version,
                archive: self.paths.temp_archive_path(&pending.asset.name),
            },
            Err(error) => {
                error!("Update to {} failed: {}", version, error);
                UpdateOutcome::Failed {
                    error,
                }
            }
        }
    }

    /// The whole pipeline: gate, resolve, download, install.
    pub async fn update(&self, progress: Option<&ProgressCallback<'_>>) -> UpdateOutcome {
        if self.in_flight.load(Ordering::SeqCst) {
            return self.already_running();
        }

        match self.prepare().await {
            Ok(Some(pending)) => self.apply(&pending, progress).await,
            Ok(None) => UpdateOutcome::UpToDate {
                current: self.current_version.clone(),
            },
            Err(error) => {
                warn!("Update check failed: {}", error);
                UpdateOutcome::Failed {
                    error,
                }
            }
        }
    }

    /// Start the pipeline on its own task.
    pub fn spawn_update(
        self: Arc<Self>,
        progress: Option<Arc<ProgressCallback<'static>>>,
    ) -> JoinHandle<UpdateOutcome>
    where
        T: 'static,
    {
        tokio::spawn(async move { self.update(progress.as_deref()).await })
    }

    /// Start the backed-up executable elevated so it can finish the swap.
    ///
    /// `global_args` are passed before the resume command. Returns `Ok(false)`
    /// when the host has no elevation mechanism or the request was refused;
    /// the caller should then [`abandon_install`](Self::abandon_install).
    pub async fn request_elevation(&self, archive: &Path, global_args: &[OsString]) -> Result<bool> {
        if !RestartSupervisor::elevation_supported() {
            return Ok(false);
        }

        let mut args = global_args.to_vec();
        args.extend([
            OsString::from("--config-dir"),
            self.paths.config_dir().as_os_str().to_owned(),
            OsString::from("upgrade"),
            OsString::from("--resume"),
            archive.as_os_str().to_owned(),
            OsString::from("--install-path"),
            self.paths.install_path().as_os_str().to_owned(),
        ]);

        let launcher = self.prepare_elevation_launcher().await?;
        RestartSupervisor::request_elevation(&launcher, &args)
    }

    /// Copy the backed-up executable, which is the running image, to a
    /// path with an executable extension the shell can start.
    pub async fn prepare_elevation_launcher(&self) -> Result<PathBuf> {
        let backup = self.paths.backup_path();
        let launcher = self.paths.elevation_launcher_path();
        tokio::fs::copy(&backup, &launcher)
            .await
            .map_err(|e| UpdateError::fs("copy executable for elevation", &launcher, &e))?;
        debug!("Prepared elevation launcher {:?}", launcher);
        Ok(launcher)
    }

    /// Undo a halted install: restore the backup and clear the lock.
    pub async fn abandon_install(&self) -> RecoveryOutcome {
        recover_interrupted_install(&self.paths).await
    }

    /// Put the backup from the last update back in place.
    pub async fn rollback(&self) -> Result<()> {
        let lock = InstallLock::new(self.paths.lock_path());
        if lock.exists().await {
            return Err(UpdateError::InstallInProgress {
                lock: lock.path().to_path_buf(),
            });
        }

        BackupManager::for_paths(&self.paths).restore_backup_with_retry().await?;
        self.clear_version_cache().await;
        Ok(())
    }

    fn already_running(&self) -> UpdateOutcome {
        warn!("Update already in progress");
        UpdateOutcome::Failed {
            error: UpdateError::InstallInProgress {
                lock: self.paths.lock_path(),
            },
        }
    }

    async fn clear_version_cache(&self) {
        match tokio::fs::remove_file(self.paths.version_cache_file()).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                debug!("Failed to clear version cache: {}", e);
            }
            _ => {}
        }
    }
}

/// Holds the in-process update flag until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn enter(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).ok()?;
        Some(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

async fn remove_archive(archive: &Path) {
    match tokio::fs::remove_file(archive).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            warn!("Failed to remove downloaded archive {:?}: {}", archive, e);
        }
        _ => {}
    }
}
