use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::core::{Result, UpdateError};
use crate::upgrade::config::UpgradeConfig;

/// User settings stored in `config.toml`.
///
/// ```toml
/// [upgrade]
/// check_on_startup = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Self-update settings.
    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

impl GlobalConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await
        } else {
            debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load and parse a config file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await.map_err(|e| UpdateError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;

        toml::from_str(&content).map_err(|e| UpdateError::Config {
            message: format!("failed to parse {}: {e}", path.display()),
        })
    }

    /// Write the config, creating the parent directory if needed.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::fs("create config directory", parent, &e))?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| UpdateError::Config {
            message: format!("failed to serialize config: {e}"),
        })?;

        fs::write(path, content).await.map_err(|e| UpdateError::fs("write config", path, &e))
    }
}
