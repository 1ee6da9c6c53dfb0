//! Command-line interface for the Monolith updater.
//!
//! Every invocation follows the same startup sequence:
//!
//! 1. Resolve the configuration directory and the executable to update
//! 2. Install logging (stderr plus `error.log` in the configuration directory)
//! 3. Run crash recovery, unless the command itself is finishing an install
//! 4. Load `config.toml`
//! 5. Run the command
//!
//! # Commands
//!
//! - (none): print the version and, if enabled, run the startup update check
//! - `upgrade`: check for, download and install updates
//! - `recover`: undo an interrupted install and report what was done

mod logging;
pub mod upgrade;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::{GlobalConfig, UpdaterPaths, current_executable, default_config_dir};
use crate::upgrade::version_check::{VersionChecker, display_update_notification};
use crate::upgrade::{RecoveryOutcome, SelfUpdater, recover_interrupted_install};

/// Everything a command needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Locations used by the update pipeline.
    pub paths: UpdaterPaths,
    /// Loaded settings.
    pub config: GlobalConfig,
    /// Whether to draw progress bars.
    pub show_progress: bool,
    /// Global flags to repeat when starting another instance, without
    /// `--config-dir`.
    pub global_args: Vec<OsString>,
    /// Whether `--config-dir` was given explicitly.
    pub explicit_config_dir: bool,
}

impl CliContext {
    /// Arguments for relaunching the application after an update.
    pub fn relaunch_args(&self) -> Vec<OsString> {
        let mut args = self.global_args.clone();
        if self.explicit_config_dir {
            args.push("--config-dir".into());
            args.push(self.paths.config_dir().as_os_str().to_owned());
        }
        args
    }
}

/// Monolith self-updater.
#[derive(Parser, Debug)]
#[command(
    name = "monolith",
    about = "Monolith mod manager updater",
    version,
    long_about = "Keeps the Monolith executable up to date: checks for new releases, \
                  verifies downloads and replaces the executable safely."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress log output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Configuration directory
    #[arg(long, global = true, value_name = "DIR", env = "MONOLITH_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check for and install updates
    Upgrade(upgrade::UpgradeArgs),

    /// Undo an interrupted update
    Recover,
}

impl Cli {
    /// Run the startup sequence and then the selected command.
    pub async fn execute(self) -> Result<()> {
        let explicit_config_dir = self.config_dir.is_some();
        let config_dir = match self.config_dir.clone() {
            Some(dir) => dir,
            None => default_config_dir()?,
        };
        let install_path = match &self.command {
            Some(Commands::Upgrade(upgrade::UpgradeArgs {
                install_path: Some(path),
                ..
            })) => path.clone(),
            _ => current_executable()?,
        };
        let paths = UpdaterPaths::new(config_dir, install_path);

        let log_file = paths.ensure_config_dir().ok().map(|()| paths.log_file());
        logging::init(self.verbose, self.quiet, log_file.as_deref());

        let resuming = matches!(&self.command, Some(Commands::Upgrade(args)) if args.is_resume());
        let explicit_recover = matches!(self.command, Some(Commands::Recover));
        if !resuming && !explicit_recover {
            report_recovery(recover_interrupted_install(&paths).await);
        }

        let config = GlobalConfig::load_or_default(&paths.config_file()).await?;
        let ctx = CliContext {
            paths,
            config,
            show_progress: !self.no_progress,
            global_args: self.global_args(),
            explicit_config_dir,
        };

        match self.command {
            Some(Commands::Upgrade(args)) => upgrade::execute(args, &ctx).await,
            Some(Commands::Recover) => {
                let outcome = recover_interrupted_install(&ctx.paths).await;
                if outcome == RecoveryOutcome::Clean {
                    println!("No interrupted update found");
                } else {
                    report_recovery(outcome);
                }
                Ok(())
            }
            None => startup(&ctx).await,
        }
    }

    fn global_args(&self) -> Vec<OsString> {
        let mut args = Vec::new();
        if self.verbose {
            args.push("--verbose".into());
        }
        if self.quiet {
            args.push("--quiet".into());
        }
        if self.no_progress {
            args.push("--no-progress".into());
        }
        args
    }
}

fn report_recovery(outcome: RecoveryOutcome) {
    match outcome {
        RecoveryOutcome::Clean => {}
        RecoveryOutcome::Restored {
            backup,
        } => {
            info!("Recovered from interrupted update using {:?}", backup);
            eprintln!(
                "{}",
                "The previous update was interrupted; the previous version was restored.".yellow()
            );
        }
        RecoveryOutcome::LockCleared => {
            eprintln!("{}", "Cleared a stale update lock.".yellow());
        }
        RecoveryOutcome::Failed {
            reason,
        } => {
            eprintln!("{} {}", "warning:".yellow().bold(), reason);
        }
    }
}

/// Default action: show the version and run the startup check.
async fn startup(ctx: &CliContext) -> Result<()> {
    let updater = SelfUpdater::from_config(ctx.paths.clone(), ctx.config.upgrade.clone())?;
    println!("Monolith {}", updater.current_version());

    match VersionChecker::new(&updater).check_for_updates_if_needed().await {
        Ok(Some(latest)) => display_update_notification(updater.current_version(), &latest),
        Ok(None) => {}
        Err(e) => warn!("Startup update check failed: {}", e),
    }
    Ok(())
}
