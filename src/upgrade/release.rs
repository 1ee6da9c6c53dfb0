//! Release metadata as published by the release-hosting API.
//!
//! The wire format is the GitHub "latest release" JSON. Only the fields the
//! updater needs are decoded; unknown fields are ignored. Checksums are read
//! from either a custom `sha256` field or GitHub's native
//! `digest: "sha256:<hex>"` field.

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::{Result, UpdateError};

/// One downloadable artifact of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetEntry {
    /// File name, matched against the platform convention.
    pub name: String,
    /// Direct download URL.
    #[serde(rename = "browser_download_url")]
    pub url: String,
    /// Expected lowercase hex SHA-256 of the file, when published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing)]
    digest: Option<String>,
}

impl AssetEntry {
    /// Build an asset entry.
    pub fn new(name: impl Into<String>, url: impl Into<String>, sha256: Option<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            sha256,
            digest: None,
        }
    }

    /// The published SHA-256, from whichever field carried it.
    pub fn expected_sha256(&self) -> Option<&str> {
        self.sha256
            .as_deref()
            .or_else(|| self.digest.as_deref().and_then(|d| d.strip_prefix("sha256:")))
            .map(str::trim)
            .filter(|hash| !hash.is_empty())
    }
}

/// An immutable description of one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseDescriptor {
    /// Release tag, e.g. `v1.1.0`.
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Human-readable changelog.
    #[serde(rename = "body", default, deserialize_with = "null_as_empty")]
    pub changelog: String,
    /// Downloadable artifacts in publication order.
    #[serde(default)]
    pub assets: Vec<AssetEntry>,
}

// GitHub sends `"body": null` for releases without notes.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ReleaseDescriptor {
    /// Decode a release from its JSON representation.
    ///
    /// `source` names the endpoint in the error message.
    pub fn from_json(json: &str, source: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| UpdateError::InvalidRelease {
            url: source.to_string(),
            reason: e.to_string(),
        })
    }

    /// The tag with any leading `v` removed.
    pub fn version(&self) -> &str {
        self.tag.trim().trim_start_matches(['v', 'V'])
    }

    /// Find an asset by exact file name.
    pub fn asset(&self, name: &str) -> Option<&AssetEntry> {
        self.assets.iter().find(|asset| asset.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GITHUB_JSON: &str = r#"{
        "tag_name": "v1.1.0",
        "name": "Monolith 1.1.0",
        "body": "- faster mod list",
        "assets": [
            {
                "name": "Monolith-linux.tar.gz",
                "browser_download_url": "https://example.com/linux.tar.gz",
                "size": 1234,
                "digest": "sha256:ABCDEF"
            },
            {
                "name": "Monolith-windows.zip",
                "browser_download_url": "https://example.com/windows.zip",
                "sha256": "0123"
            },
            {
                "name": "Monolith-macos.dmg",
                "browser_download_url": "https://example.com/macos.dmg"
            }
        ]
    }"#;

    #[test]
    fn test_decode_github_release() {
        let release = ReleaseDescriptor::from_json(GITHUB_JSON, "test").unwrap();
        assert_eq!(release.version(), "1.1.0");
        assert_eq!(release.changelog, "- faster mod list");
        assert_eq!(release.assets.len(), 3);

        let linux = release.asset("Monolith-linux.tar.gz").unwrap();
        assert_eq!(linux.url, "https://example.com/linux.tar.gz");
        assert_eq!(linux.expected_sha256(), Some("ABCDEF"));

        let windows = release.asset("Monolith-windows.zip").unwrap();
        assert_eq!(windows.expected_sha256(), Some("0123"));

        assert_eq!(release.asset("Monolith-macos.dmg").unwrap().expected_sha256(), None);
        assert!(release.asset("missing").is_none());
    }

    #[test]
    fn test_missing_body_and_assets_default() {
        let release = ReleaseDescriptor::from_json(r#"{"tag_name": "2.0"}"#, "test").unwrap();
        assert!(release.changelog.is_empty());
        assert!(release.assets.is_empty());

        let release =
            ReleaseDescriptor::from_json(r#"{"tag_name": "2.0", "body": null}"#, "test").unwrap();
        assert!(release.changelog.is_empty());
    }

    #[test]
    fn test_invalid_json_is_invalid_release() {
        let err = ReleaseDescriptor::from_json("<html>rate limited</html>", "api").unwrap_err();
        assert!(matches!(err, UpdateError::InvalidRelease { url, .. } if url == "api"));
    }
}
