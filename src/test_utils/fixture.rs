//! A throwaway installation to update.

use std::path::PathBuf;
use tempfile::TempDir;

use super::{FakeTransport, sha256_hex, tar_gz_archive};
use crate::config::UpdaterPaths;
use crate::upgrade::SelfUpdater;
use crate::upgrade::asset::Platform;
use crate::upgrade::config::UpgradeConfig;

/// An installed "old build" executable plus a config directory, both inside
/// a temporary directory that is removed on drop.
///
/// The installed version is [`InstallFixture::CURRENT_VERSION`], assets use
/// the `app` prefix, and the updater resolves assets for Linux regardless of
/// the host.
pub struct InstallFixture {
    /// Root of the fixture.
    pub temp: TempDir,
    /// Paths handed to the pipeline.
    pub paths: UpdaterPaths,
}

impl InstallFixture {
    /// Version the fixture's executable claims to be.
    pub const CURRENT_VERSION: &'static str = "1.0.5";
    /// Plain-text version endpoint.
    pub const VERSION_URL: &'static str = "https://updates.test/version.txt";
    /// Release JSON endpoint.
    pub const RELEASE_URL: &'static str = "https://updates.test/releases/latest";
    /// Contents of the installed executable.
    pub const OLD_BINARY: &'static [u8] = b"old build";
    /// Asset name the updater expects.
    pub const ASSET_NAME: &'static str = "app-linux.tar.gz";

    /// Create the fixture with the old executable in place.
    pub fn new() -> Self {
        let temp = TempDir::new().expect("create temp dir");
        let install_dir = temp.path().join("install");
        std::fs::create_dir_all(&install_dir).expect("create install dir");

        let paths = UpdaterPaths::new(temp.path().join("config"), install_dir.join("monolith"));
        std::fs::write(paths.install_path(), Self::OLD_BINARY).expect("write old binary");

        Self {
            temp,
            paths,
        }
    }

    /// Settings pointing at the fixture endpoints, without retry delays.
    pub fn config(&self) -> UpgradeConfig {
        UpgradeConfig {
            version_url: Self::VERSION_URL.to_string(),
            release_url: Self::RELEASE_URL.to_string(),
            asset_prefix: "app".to_string(),
            retry_delay_ms: 0,
            ..UpgradeConfig::default()
        }
    }

    /// Download URL of an asset.
    pub fn asset_url(name: &str) -> String {
        format!("https://updates.test/download/{name}")
    }

    /// GitHub-style release JSON with one asset.
    pub fn release_json(version: &str, asset_name: &str, sha256: Option<&str>) -> String {
        let mut asset = serde_json::json!({
            "name": asset_name,
            "browser_download_url": Self::asset_url(asset_name),
        });
        if let Some(sha256) = sha256 {
            asset["sha256"] = serde_json::Value::from(sha256);
        }

        serde_json::json!({
            "tag_name": format!("v{version}"),
            "body": format!("Release {version}"),
            "assets": [asset],
        })
        .to_string()
    }

    /// A transport publishing `version` with a Linux tarball containing
    /// `binary` and its correct checksum.
    pub fn transport_for(version: &str, binary: &[u8]) -> FakeTransport {
        let archive = tar_gz_archive(&[("monolith", binary)]);
        let digest = sha256_hex(&archive);

        FakeTransport::new()
            .with_text(Self::VERSION_URL, version)
            .with_text(
                Self::RELEASE_URL,
                &Self::release_json(version, Self::ASSET_NAME, Some(&digest)),
            )
            .with_file(&Self::asset_url(Self::ASSET_NAME), archive)
    }

    /// An updater for this installation over `transport`.
    pub fn updater(&self, transport: FakeTransport) -> SelfUpdater<FakeTransport> {
        SelfUpdater::new(transport, self.paths.clone(), self.config())
            .with_current_version(Self::CURRENT_VERSION)
            .with_platform(Platform::Linux)
    }

    /// Contents of the install path.
    pub fn installed(&self) -> Vec<u8> {
        std::fs::read(self.paths.install_path()).expect("read installed binary")
    }

    /// Every entry in the config directory, sorted.
    pub fn config_dir_entries(&self) -> Vec<PathBuf> {
        let mut entries: Vec<PathBuf> = match std::fs::read_dir(self.paths.config_dir()) {
            Ok(dir) => dir.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        };
        entries.sort();
        entries
    }
}

impl Default for InstallFixture {
    fn default() -> Self {
        Self::new()
    }
}
