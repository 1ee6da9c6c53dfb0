//! Configuration for the updater.
//!
//! Two pieces, both resolved once at startup and read-only afterwards:
//!
//! - [`GlobalConfig`]: user settings persisted as `config.toml` in the
//!   configuration directory. Currently only the `[upgrade]` table.
//! - [`UpdaterPaths`]: every filesystem location the pipeline touches,
//!   derived from the configuration directory and the install path.
//!
//! # Configuration Directory
//!
//! - `MONOLITH_CONFIG_DIR` if set
//! - otherwise the platform config directory joined with `monolith`
//!   (`$XDG_CONFIG_HOME` or `~/.config` on Linux, `%APPDATA%` on Windows,
//!   `~/Library/Application Support` on macOS)

mod global;
mod paths;

pub use global::GlobalConfig;
pub use paths::{UpdaterPaths, current_executable, default_config_dir};
