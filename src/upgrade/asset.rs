//! Platform to release-asset mapping.
//!
//! Exactly one asset is published per operating system, named
//! `<prefix>-<os>.<ext>`. Selection depends only on the operating system;
//! CPU architecture is not considered, so an arm64 Linux host is offered the
//! same archive as x86_64.

use std::fmt;

use tracing::debug;

use crate::core::{Result, UpdateError};
use crate::upgrade::release::{AssetEntry, ReleaseDescriptor};

/// Operating systems with a published build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    /// Windows, shipped as a zip archive.
    Windows,
    /// Linux, shipped as a gzip-compressed tarball.
    Linux,
    /// macOS, shipped as a disk image for manual install.
    MacOs,
}

impl Platform {
    /// Map an OS identifier (as in [`std::env::consts::OS`]) to a platform.
    pub fn from_os(os: &str) -> Result<Self> {
        match os {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOs),
            other => Err(UpdateError::UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    /// The platform this binary is running on.
    pub fn current() -> Result<Self> {
        Self::from_os(std::env::consts::OS)
    }

    /// Asset file name for this platform.
    #[must_use]
    pub fn asset_name(self, prefix: &str) -> String {
        let suffix = match self {
            Self::Windows => "windows.zip",
            Self::Linux => "linux.tar.gz",
            Self::MacOs => "macos.dmg",
        };
        format!("{prefix}-{suffix}")
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::MacOs => "macos",
        })
    }
}

/// Picks the release asset for one platform.
///
/// Resolution is pure: it reads the release descriptor and nothing else, so a
/// failed lookup never has filesystem side effects.
#[derive(Debug, Clone)]
pub struct AssetResolver {
    platform: Platform,
    prefix: String,
}

impl AssetResolver {
    /// Resolver for an explicit platform.
    pub fn new(platform: Platform, prefix: impl Into<String>) -> Self {
        Self {
            platform,
            prefix: prefix.into(),
        }
    }

    /// Resolver for the host platform.
    ///
    /// Fails with [`UpdateError::UnsupportedPlatform`] on hosts without a
    /// published build.
    pub fn for_host(prefix: impl Into<String>) -> Result<Self> {
        Ok(Self::new(Platform::current()?, prefix))
    }

    /// The platform being resolved for.
    pub const fn platform(&self) -> Platform {
        self.platform
    }

    /// The asset name this resolver looks for.
    pub fn expected_name(&self) -> String {
        self.platform.asset_name(&self.prefix)
    }

    /// Select this platform's asset from a release.
    ///
    /// Fails with [`UpdateError::AssetNotFound`] when the release omits the
    /// platform's build.
    pub fn resolve<'a>(&self, release: &'a ReleaseDescriptor) -> Result<&'a AssetEntry> {
        let name = self.expected_name();
        debug!("Looking for asset {} in release {}", name, release.tag);

        release.asset(&name).ok_or_else(|| UpdateError::AssetNotFound {
            asset: name,
            version: release.tag.clone(),
        })
    }
}
