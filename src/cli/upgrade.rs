//! The `upgrade` command.
//!
//! # Examples
//!
//! ```bash
//! monolith upgrade              # Check, show release notes, ask, install
//! monolith upgrade --yes        # Install without asking, then restart
//! monolith upgrade --no-restart # Install but do not start the new version
//! monolith upgrade --check      # Only report whether an update exists
//! monolith upgrade --status     # Current and latest version
//! monolith upgrade --force      # Reinstall even if up to date
//! monolith upgrade --rollback   # Restore the build replaced by the last update
//! ```

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;
use std::io::{BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::CliContext;
use crate::core::UpdateError;
use crate::upgrade::download::ProgressCallback;
use crate::upgrade::restart::RestartSupervisor;
use crate::upgrade::version_check::{VersionChecker, format_version_info};
use crate::upgrade::{InstallOutcome, RecoveryOutcome, SelfUpdater, UpdateOutcome};
use crate::utils::DownloadProgressBar;

/// Check for and install a newer Monolith release.
#[derive(Args, Debug, Default)]
pub struct UpgradeArgs {
    /// Only check whether an update is available.
    #[arg(long, conflicts_with_all = ["status", "rollback"])]
    pub check: bool,

    /// Show the current and latest versions.
    #[arg(short, long, conflicts_with = "rollback")]
    pub status: bool,

    /// Install even if the current version is up to date.
    #[arg(short, long)]
    pub force: bool,

    /// Install without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    /// Restore the executable replaced by the last update.
    #[arg(long)]
    pub rollback: bool,

    /// Do not start the updated application after installing.
    #[arg(long)]
    pub no_restart: bool,

    /// Finish an install that stopped for elevation, from its archive.
    #[arg(long, value_name = "ARCHIVE", hide = true)]
    pub resume: Option<PathBuf>,

    /// Executable to replace, instead of the running one.
    #[arg(long, value_name = "PATH", hide = true)]
    pub install_path: Option<PathBuf>,
}

impl UpgradeArgs {
    /// Whether this invocation continues an interrupted install, in which
    /// case startup recovery must not undo it first.
    pub fn is_resume(&self) -> bool {
        self.resume.is_some()
    }
}

/// Run the command.
pub async fn execute(args: UpgradeArgs, ctx: &CliContext) -> Result<()> {
    let updater = SelfUpdater::from_config(ctx.paths.clone(), ctx.config.upgrade.clone())?
        .force(args.force);

    if let Some(archive) = &args.resume {
        return resume(&updater, archive).await;
    }

    if args.rollback {
        return rollback(&updater).await;
    }

    if args.status {
        return show_status(&updater).await;
    }

    if args.check {
        return check_for_updates(&updater).await;
    }

    perform_upgrade(&updater, &args, ctx).await
}

async fn rollback(updater: &SelfUpdater) -> Result<()> {
    println!("{}", "Rolling back to previous version...".yellow());

    updater.rollback().await.context("Failed to restore from backup")?;

    println!("{}", "Successfully rolled back to previous version".green());
    Ok(())
}

async fn show_status(updater: &SelfUpdater) -> Result<()> {
    let latest = match VersionChecker::new(updater).check_now().await {
        Ok(latest) => latest,
        Err(e) => {
            debug!("Failed to check for updates: {}", e);
            None
        }
    };

    println!("{}", format_version_info(updater.current_version(), latest.as_deref()));
    Ok(())
}

async fn check_for_updates(updater: &SelfUpdater) -> Result<()> {
    println!("{}", "Checking for updates...".cyan());

    match VersionChecker::new(updater).check_now().await? {
        Some(latest) => {
            println!(
                "{}",
                format!("Update available: {} -> {}", updater.current_version(), latest).green()
            );
            println!("Run `monolith upgrade` to install the latest version");
        }
        None => {
            println!(
                "{}",
                format!("You are on the latest version ({})", updater.current_version()).green()
            );
        }
    }
    Ok(())
}

async fn perform_upgrade(updater: &SelfUpdater, args: &UpgradeArgs, ctx: &CliContext) -> Result<()> {
    println!("{}", "Checking for updates...".cyan());

    let Some(pending) = updater.prepare().await? else {
        println!(
            "{}",
            format!("You are on the latest version ({})", updater.current_version()).green()
        );
        return Ok(());
    };

    println!(
        "Update available: {} -> {}",
        updater.current_version().yellow(),
        pending.version().green().bold()
    );
    if !pending.changelog().trim().is_empty() {
        println!("\n{}\n", pending.changelog().trim());
    }

    if !args.yes && !confirm(&format!("Install version {}?", pending.version()))? {
        println!("Update cancelled");
        return Ok(());
    }

    let bar = DownloadProgressBar::new(&pending.asset.name, ctx.show_progress);
    let callback = bar.callback();
    let progress: &ProgressCallback<'_> = &callback;
    let outcome = updater.apply(&pending, Some(progress)).await;
    bar.finish_and_clear();

    report(updater, outcome, args, ctx).await
}

async fn report(
    updater: &SelfUpdater,
    outcome: UpdateOutcome,
    args: &UpgradeArgs,
    ctx: &CliContext,
) -> Result<()> {
    match outcome {
        UpdateOutcome::Updated {
            version,
            install_path,
        } => {
            println!("{}", format!("Successfully updated to version {version}").green());
            if args.no_restart {
                println!("Restart Monolith to use the new version");
                return Ok(());
            }
            match RestartSupervisor::new(install_path, ctx.relaunch_args()).relaunch() {
                Ok(pid) => {
                    debug!("Relaunched as pid {}", pid);
                    println!("Restarting Monolith...");
                }
                Err(e) => {
                    warn!("{}", e);
                    println!("Restart Monolith to use the new version");
                }
            }
            Ok(())
        }
        UpdateOutcome::UpToDate {
            current,
        } => {
            println!("{}", format!("You are on the latest version ({current})").green());
            Ok(())
        }
        UpdateOutcome::ManualInstall {
            version,
            image,
        } => {
            println!("Downloaded Monolith {version} to {}", image.display());
            println!("Open the disk image and replace the application to finish the update");
            Ok(())
        }
        UpdateOutcome::ElevationRequested {
            archive,
            ..
        } => hand_off_to_elevated(updater, &archive, ctx).await,
        UpdateOutcome::Failed {
            error,
        } => Err(error.into()),
    }
}

async fn hand_off_to_elevated(updater: &SelfUpdater, archive: &Path, ctx: &CliContext) -> Result<()> {
    let requested = updater.request_elevation(archive, &ctx.global_args).await;

    if let Ok(true) = requested {
        println!("Administrator rights are required; continuing in an elevated window");
        return Ok(());
    }

    // Nobody will finish the swap: put the old executable back.
    match updater.abandon_install().await {
        RecoveryOutcome::Failed {
            reason,
        } => debug!("Restoring after denied elevation failed: {}", reason),
        outcome => debug!("Restored after denied elevation: {:?}", outcome),
    }
    if let Err(e) = tokio::fs::remove_file(archive).await {
        debug!("Failed to remove {:?}: {}", archive, e);
    }

    requested?;
    Err(UpdateError::PermissionElevationRequired {
        path: updater.paths().install_path().to_path_buf(),
    }
    .into())
}

async fn resume(updater: &SelfUpdater, archive: &Path) -> Result<()> {
    println!("{}", "Finishing update...".cyan());

    match updater.resume_install(archive).await? {
        InstallOutcome::Committed {
            install_path,
        } => {
            println!("{}", format!("Successfully updated {}", install_path.display()).green());
        }
        InstallOutcome::ManualInstall {
            image,
        } => {
            println!("Open {} to finish the update", image.display());
        }
    }
    Ok(())
}

fn confirm(question: &str) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        bail!("Cannot ask for confirmation without a terminal; pass --yes to install");
    }

    print!("{question} [y/N] ");
    std::io::stdout().flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
