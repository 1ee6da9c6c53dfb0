//! Global constants used throughout the updater.
//!
//! Timeouts, retry parameters and the well-known file names that make up the
//! on-disk install state. The file names are part of the crash-recovery
//! contract: a newer build must keep using the same names so it can recover
//! from an install interrupted by an older one.

use std::time::Duration;

/// Name of the application directory under the platform config directory.
pub const APP_DIR_NAME: &str = "monolith";

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "MONOLITH_CONFIG_DIR";

/// Environment variable that hides progress bars when set.
pub const NO_PROGRESS_ENV: &str = "MONOLITH_NO_PROGRESS";

/// Sentinel whose existence marks an in-flight or interrupted install.
pub const LOCK_FILE_NAME: &str = "update.lock";

/// Scratch directory for archive extraction, recreated per attempt.
pub const STAGING_DIR_NAME: &str = "update_extract";

/// Prefix of the downloaded archive inside the config directory.
pub const TEMP_ARCHIVE_PREFIX: &str = "update_temp_";

/// Suffix appended to the install path to form the backup path.
pub const BACKUP_SUFFIX: &str = ".old";

/// Suffix appended to the install path for the write-permission probe.
pub const PROBE_SUFFIX: &str = ".test";

/// Copy of the backed-up executable that an elevation request starts.
/// The shell only runs files with a known executable extension.
pub const ELEVATION_LAUNCHER_NAME: &str = "monolith-elevate.exe";

/// Persisted updater settings.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Log file kept next to the config, readable when no console exists.
pub const LOG_FILE_NAME: &str = "error.log";

/// Cached result of the last startup version check.
pub const VERSION_CACHE_FILE_NAME: &str = "version_check_cache.json";

/// Default per-request network timeout (10 seconds).
///
/// Applies to every single attempt, metadata fetches included, so no
/// network operation can block indefinitely.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Total download attempts before giving up.
pub const DEFAULT_DOWNLOAD_ATTEMPTS: usize = 3;

/// Fixed delay between download attempts (2 seconds).
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Chunk size for streaming digests (8 KiB).
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;

/// Attempts made when restoring a backup during a manual rollback.
pub const RESTORE_ATTEMPTS: u32 = 3;

/// Default interval between startup update checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 86_400;
