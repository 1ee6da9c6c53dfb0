use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETRY_DELAY,
};

/// Configuration settings for self-update behavior.
///
/// Lives in the `[upgrade]` table of `config.toml` in the configuration
/// directory. Every field has a default, so a missing file or a partial table
/// is always valid.
///
/// ## TOML Example
/// ```toml
/// [upgrade]
/// version_url = "https://example.com/version.txt"
/// release_url = "https://api.github.com/repos/owner/repo/releases/latest"
/// asset_prefix = "Monolith"
/// verify_checksum = true
/// check_on_startup = false
/// check_interval = 86400
/// request_timeout_secs = 10
/// max_attempts = 3
/// retry_delay_ms = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Plain-text endpoint returning the latest version string.
    ///
    /// Used for the cheap pre-check before the release metadata is fetched.
    #[serde(default = "default_version_url")]
    pub version_url: String,

    /// JSON endpoint returning the latest release descriptor.
    #[serde(default = "default_release_url")]
    pub release_url: String,

    /// Prefix of the per-platform asset names (`<prefix>-linux.tar.gz`, ...).
    #[serde(default = "default_asset_prefix")]
    pub asset_prefix: String,

    /// Whether to verify the published SHA-256 of downloaded assets.
    ///
    /// Assets without a published digest are accepted either way.
    #[serde(default = "default_true")]
    pub verify_checksum: bool,

    /// Whether the application checks for updates when it starts.
    #[serde(default)]
    pub check_on_startup: bool,

    /// Minimum seconds between two startup checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Timeout applied to each individual network request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Download attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Fixed pause between download attempts.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            version_url: default_version_url(),
            release_url: default_release_url(),
            asset_prefix: default_asset_prefix(),
            verify_checksum: true,
            check_on_startup: false,
            check_interval: default_check_interval(),
            request_timeout_secs: default_request_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_version_url() -> String {
    "https://raw.githubusercontent.com/fl4te/monolith/refs/heads/main/version.txt".to_string()
}

fn default_release_url() -> String {
    "https://api.github.com/repos/fl4te/monolith/releases/latest".to_string()
}

fn default_asset_prefix() -> String {
    "Monolith".to_string()
}

const fn default_true() -> bool {
    true
}

const fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

const fn default_max_attempts() -> usize {
    DEFAULT_DOWNLOAD_ATTEMPTS
}

const fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY.as_millis() as u64
}

impl UpgradeConfig {
    /// Create a new `UpgradeConfig` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request timeout as a [`Duration`].
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delay between download attempts as a [`Duration`].
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Attempts clamped to at least one.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_table_fills_defaults() {
        let config: UpgradeConfig = toml::from_str("asset_prefix = \"app\"\nmax_attempts = 0\n")
            .unwrap();
        assert_eq!(config.asset_prefix, "app");
        assert!(config.verify_checksum);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.retry_delay(), Duration::from_secs(2));
        assert_eq!(config.attempts(), 1);
    }
}
