use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, info};

use crate::core::{Result, UpdateError};
use crate::upgrade::SelfUpdater;
use crate::upgrade::transport::Transport;
use crate::upgrade::version;

/// The result of the last version check, persisted between runs.
///
/// Stored as JSON in `version_check_cache.json` in the configuration
/// directory. The cache keeps startup checks from hitting the network more
/// than once per [`check_interval`](crate::upgrade::config::UpgradeConfig::check_interval)
/// and keeps track of whether the user has already been told about the
/// available version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionCheckCache {
    /// Latest published version at the time of the check.
    pub latest_version: String,
    /// Version that was running during the check.
    pub current_version: String,
    /// When the check ran.
    pub checked_at: DateTime<Utc>,
    /// Whether `latest_version` is newer than `current_version`.
    pub update_available: bool,
    /// Whether the user has been notified about `latest_version`.
    pub notified: bool,
    /// How many times the user has been notified.
    #[serde(default)]
    pub notification_count: u32,
}

impl VersionCheckCache {
    /// Cache entry for a check that just ran.
    pub fn new(current_version: String, latest_version: String) -> Self {
        let update_available = version::is_update_available(&current_version, &latest_version);

        Self {
            latest_version,
            current_version,
            checked_at: Utc::now(),
            update_available,
            notified: false,
            notification_count: 0,
        }
    }

    /// Whether the entry is younger than `interval_seconds`.
    pub fn is_valid(&self, interval_seconds: u64) -> bool {
        let age = Utc::now() - self.checked_at;
        age.num_seconds() < i64::try_from(interval_seconds).unwrap_or(i64::MAX)
    }

    /// Record that the user was told about the update.
    pub fn mark_notified(&mut self) {
        self.notified = true;
        self.notification_count += 1;
    }

    /// Whether to remind the user about an update they were already told about.
    ///
    /// Reminders back off: 24 hours after the first notification, then 48,
    /// 96 and at most 192.
    pub fn should_notify(&self) -> bool {
        if !self.update_available {
            return false;
        }

        if !self.notified {
            return true;
        }

        let hours_since_check = (Utc::now() - self.checked_at).num_hours();
        let backoff_hours = 24 * (1i64 << self.notification_count.min(3));

        hours_since_check >= backoff_hours
    }
}

/// Startup update notifications backed by [`VersionCheckCache`].
pub struct VersionChecker<'u, T: Transport> {
    cache_path: PathBuf,
    updater: &'u SelfUpdater<T>,
}

impl<'u, T: Transport> VersionChecker<'u, T> {
    /// Checker using `updater`'s endpoints and cache location.
    pub fn new(updater: &'u SelfUpdater<T>) -> Self {
        Self {
            cache_path: updater.paths().version_cache_file(),
            updater,
        }
    }

    /// Check for an update if the cached result is stale.
    ///
    /// Returns the version to notify the user about, if any. Network
    /// failures are logged and reported as `Ok(None)` so a startup check
    /// never gets in the way of the application.
    pub async fn check_for_updates_if_needed(&self) -> Result<Option<String>> {
        let config = self.updater.config();
        if !config.check_on_startup || config.check_interval == 0 {
            debug!("Automatic update checking is disabled");
            return Ok(None);
        }

        let mut cache = self.load_cache().await;
        let stale = cache.as_ref().is_none_or(|c| !c.is_valid(config.check_interval));

        if stale {
            debug!("Performing automatic update check");
            let current = self.updater.current_version().to_string();

            match self.updater.check_for_update().await {
                Ok(Some(latest)) => {
                    let mut fresh = VersionCheckCache::new(current, latest.clone());
                    let should_notify = cache
                        .as_ref()
                        .is_none_or(|old| old.latest_version != latest || !old.notified);

                    if should_notify {
                        fresh.mark_notified();
                    }
                    self.save_cache(&fresh).await?;
                    if should_notify {
                        info!("Update available: {} -> {}", fresh.current_version, latest);
                        return Ok(Some(latest));
                    }
                }
                Ok(None) => {
                    self.save_cache(&VersionCheckCache::new(current.clone(), current)).await?;
                    debug!("No update available, cache updated");
                }
                Err(e) => {
                    debug!("Update check failed: {}", e);
                }
            }
        } else if let Some(cached) = cache.as_mut() {
            if cached.should_notify() {
                cached.mark_notified();
                self.save_cache(cached).await?;
                info!(
                    "Update available (reminder): {} -> {}",
                    cached.current_version, cached.latest_version
                );
                return Ok(Some(cached.latest_version.clone()));
            }
        }

        Ok(None)
    }

    /// Check now, bypassing and then refreshing the cache.
    pub async fn check_now(&self) -> Result<Option<String>> {
        debug!("Performing explicit update check");

        let result = self.updater.check_for_update().await?;
        let current = self.updater.current_version().to_string();
        let latest = result.clone().unwrap_or_else(|| current.clone());
        self.save_cache(&VersionCheckCache::new(current, latest)).await?;

        Ok(result)
    }

    /// The cached check, if one is present and readable.
    ///
    /// A corrupt cache is treated as missing.
    pub async fn load_cache(&self) -> Option<VersionCheckCache> {
        let content = fs::read_to_string(&self.cache_path).await.ok()?;
        match serde_json::from_str(&content) {
            Ok(cache) => Some(cache),
            Err(e) => {
                debug!("Ignoring unreadable version cache: {}", e);
                None
            }
        }
    }

    async fn save_cache(&self, cache: &VersionCheckCache) -> Result<()> {
        let content = serde_json::to_string_pretty(cache).map_err(|e| UpdateError::Config {
            message: format!("failed to serialize version cache: {e}"),
        })?;

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::fs("create cache directory", parent, &e))?;
        }

        fs::write(&self.cache_path, content)
            .await
            .map_err(|e| UpdateError::fs("write version cache", &self.cache_path, &e))?;

        debug!("Saved version check to cache");
        Ok(())
    }

    /// Remove the cached check.
    pub async fn clear_cache(&self) -> Result<()> {
        match fs::remove_file(&self.cache_path).await {
            Ok(()) => {
                debug!("Cleared version cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(UpdateError::fs("remove version cache", &self.cache_path, &e)),
        }
    }
}

/// Print the "new version available" banner to stderr.
pub fn display_update_notification(current_version: &str, latest_version: &str) {
    let rule = "─".repeat(50);

    eprintln!();
    eprintln!("{}", rule.bright_cyan());
    eprintln!("A new version of Monolith is available!");
    eprintln!();
    eprintln!("  Current version: {}", current_version.yellow());
    eprintln!("  Latest version:  {}", latest_version.green().bold());
    eprintln!();
    eprintln!("  Run {} to upgrade", "monolith upgrade".cyan().bold());
    eprintln!("{}", rule.bright_cyan());
    eprintln!();
}

/// Two-line summary of the running and latest versions.
pub fn format_version_info(current: &str, latest: Option<&str>) -> String {
    match latest {
        Some(v) if version::is_update_available(current, v) => {
            format!("Current version: {current}\nLatest version:  {v} (update available)")
        }
        _ => format!("Current version: {current} (up to date)"),
    }
}
