use std::path::{Path, PathBuf};

use crate::constants::{
    APP_DIR_NAME, BACKUP_SUFFIX, CONFIG_DIR_ENV, CONFIG_FILE_NAME, ELEVATION_LAUNCHER_NAME,
    LOCK_FILE_NAME, LOG_FILE_NAME, PROBE_SUFFIX, STAGING_DIR_NAME, TEMP_ARCHIVE_PREFIX,
    VERSION_CACHE_FILE_NAME,
};
use crate::core::{Result, UpdateError};

/// Resolve the platform configuration directory.
///
/// Honors `MONOLITH_CONFIG_DIR`, then falls back to the platform convention.
pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
        .map(|base| base.join(APP_DIR_NAME))
        .ok_or_else(|| UpdateError::Config {
            message: "unable to determine the configuration directory".to_string(),
        })
}

/// Canonical path of the running executable.
pub fn current_executable() -> Result<PathBuf> {
    let exe = std::env::current_exe().map_err(|e| UpdateError::Config {
        message: format!("unable to locate the running executable: {e}"),
    })?;
    Ok(exe.canonicalize().unwrap_or(exe))
}

/// Every filesystem location touched by the update pipeline.
///
/// Built once at startup and passed by reference into each component. The
/// names of the derived paths are fixed so that a later run can always find
/// the lock and backup left behind by an interrupted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdaterPaths {
    config_dir: PathBuf,
    install_path: PathBuf,
}

impl UpdaterPaths {
    /// Paths for an explicit configuration directory and executable.
    pub fn new(config_dir: impl Into<PathBuf>, install_path: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            install_path: install_path.into(),
        }
    }

    /// Paths for the running executable and the default configuration directory.
    ///
    /// The executable path is canonicalized so that a symlinked launcher is
    /// never replaced instead of the real binary.
    pub fn discover() -> Result<Self> {
        Ok(Self::new(default_config_dir()?, current_executable()?))
    }

    /// Create the configuration directory if it does not exist yet.
    pub fn ensure_config_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)
            .map_err(|e| UpdateError::fs("create config directory", &self.config_dir, &e))
    }

    /// The configuration directory.
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// The executable being updated.
    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    /// The install lock sentinel.
    pub fn lock_path(&self) -> PathBuf {
        self.config_dir.join(LOCK_FILE_NAME)
    }

    /// The extraction scratch directory.
    pub fn staging_dir(&self) -> PathBuf {
        self.config_dir.join(STAGING_DIR_NAME)
    }

    /// Sibling path holding the previous executable during an install.
    pub fn backup_path(&self) -> PathBuf {
        with_appended_suffix(&self.install_path, BACKUP_SUFFIX)
    }

    /// Zero-byte file used to probe write access next to the executable.
    pub fn probe_path(&self) -> PathBuf {
        with_appended_suffix(&self.install_path, PROBE_SUFFIX)
    }

    /// Executable copy started for an elevated resume.
    pub fn elevation_launcher_path(&self) -> PathBuf {
        self.config_dir.join(ELEVATION_LAUNCHER_NAME)
    }

    /// Download target for an asset.
    pub fn temp_archive_path(&self, asset_name: &str) -> PathBuf {
        let sanitized = asset_name.replace(['/', '\\'], "_");
        self.config_dir.join(format!("{TEMP_ARCHIVE_PREFIX}{sanitized}"))
    }

    /// The persisted settings file.
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE_NAME)
    }

    /// The log file.
    pub fn log_file(&self) -> PathBuf {
        self.config_dir.join(LOG_FILE_NAME)
    }

    /// The startup version-check cache.
    pub fn version_cache_file(&self) -> PathBuf {
        self.config_dir.join(VERSION_CACHE_FILE_NAME)
    }
}

fn with_appended_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}
