//! Error handling for the self-update pipeline
//!
//! Every component returns [`UpdateError`], a closed set of failure kinds.
//! Low-level I/O and transport errors are classified at the component that
//! observes them; nothing above the installer ever sees a raw `io::Error`.
//!
//! # Error Categories
//!
//! - **Retryable**: [`UpdateError::Network`]
//! - **Not retryable, nothing touched**: [`UpdateError::UnsupportedPlatform`],
//!   [`UpdateError::AssetNotFound`], [`UpdateError::IntegrityMismatch`],
//!   [`UpdateError::DownloadFailed`], [`UpdateError::BackupFailed`]
//! - **Rolled back**: [`UpdateError::ExtractionFailed`],
//!   [`UpdateError::BinaryNotFound`], [`UpdateError::SwapFailed`]
//! - **Non-terminal**: [`UpdateError::PermissionElevationRequired`]
//! - **Fatal**: [`UpdateError::RollbackFailed`], which names the backup path
//!   so a human can finish the restore by hand
//!
//! The CLI converts any error into an [`ErrorContext`] through
//! [`user_friendly_error`], which adds details and a suggestion.
//!
//! ```rust,no_run
//! use monolith_updater::core::{UpdateError, user_friendly_error};
//!
//! let err = UpdateError::UnsupportedPlatform { os: "freebsd".to_string() };
//! user_friendly_error(anyhow::Error::from(err)).display();
//! ```

use colored::Colorize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used by the update components.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// The error type for every update operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    /// Transport-level failure (connect, timeout, HTTP status, body read).
    #[error("Network error for {url}: {reason}")]
    Network {
        /// URL being fetched
        url: String,
        /// Transport error message
        reason: String,
    },

    /// All download attempts failed with network errors.
    #[error("Download of {url} failed after {attempts} attempts: {reason}")]
    DownloadFailed {
        /// Asset URL
        url: String,
        /// Attempts made
        attempts: usize,
        /// Error from the last attempt
        reason: String,
    },

    /// The downloaded file does not hash to the published digest.
    #[error("Checksum mismatch for {asset}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// Asset name
        asset: String,
        /// Digest published with the release
        expected: String,
        /// Digest of the downloaded bytes
        actual: String,
    },

    /// No asset naming convention exists for the host operating system.
    #[error("Self-update is not supported on {os}")]
    UnsupportedPlatform {
        /// Host operating system identifier
        os: String,
    },

    /// The release does not carry a build for this platform.
    #[error("No update available for your platform: release {version} has no asset named {asset}")]
    AssetNotFound {
        /// Expected asset file name
        asset: String,
        /// Release tag
        version: String,
    },

    /// The release metadata could not be decoded.
    #[error("Invalid release metadata from {url}: {reason}")]
    InvalidRelease {
        /// Metadata endpoint
        url: String,
        /// Decode error
        reason: String,
    },

    /// An install lock already exists; recovery must run first.
    #[error("An update is already in progress or was interrupted (lock file {} exists)", lock.display())]
    InstallInProgress {
        /// Path of the lock sentinel
        lock: PathBuf,
    },

    /// The current executable could not be renamed to its backup path.
    #[error("Failed to back up {}: {reason}", path.display())]
    BackupFailed {
        /// Executable being backed up
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// The downloaded archive could not be unpacked.
    #[error("Failed to extract {}: {reason}", archive.display())]
    ExtractionFailed {
        /// Archive path
        archive: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// The archive holds nothing that looks like the application.
    #[error("Could not find the application file in {}", archive.display())]
    BinaryNotFound {
        /// Archive path
        archive: PathBuf,
    },

    /// The install location is not writable by the current user.
    #[error("Replacing {} requires elevated privileges", path.display())]
    PermissionElevationRequired {
        /// Install path
        path: PathBuf,
    },

    /// Moving the new executable into place failed for a non-permission reason.
    #[error("Failed to replace {}: {reason}", path.display())]
    SwapFailed {
        /// Install path
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// Restoring the backup failed; the install is stuck mid-flight.
    #[error("Rollback failed, restore {} to {} manually: {reason}", backup.display(), path.display())]
    RollbackFailed {
        /// Backup binary left on disk
        backup: PathBuf,
        /// Install path it belongs at
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// Filesystem error outside the install state machine.
    #[error("File system error during {operation} on {}: {reason}", path.display())]
    FileSystem {
        /// What was being done
        operation: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        reason: String,
    },

    /// Configuration could not be loaded or resolved.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the problem
        message: String,
    },

    /// The relaunch or elevation request could not be issued.
    #[error("Failed to restart the application: {reason}")]
    Restart {
        /// Underlying error
        reason: String,
    },
}

impl UpdateError {
    /// Only transient transport failures are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    /// Whether this error may have left install state on disk.
    ///
    /// `false` means nothing at the install path was modified.
    #[must_use]
    pub const fn touched_install(&self) -> bool {
        matches!(
            self,
            Self::ExtractionFailed { .. }
                | Self::BinaryNotFound { .. }
                | Self::SwapFailed { .. }
                | Self::PermissionElevationRequired { .. }
                | Self::RollbackFailed { .. }
        )
    }

    pub(crate) fn fs(operation: &str, path: impl Into<PathBuf>, err: &std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.to_string(),
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// An error plus the text a user needs to act on it.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: anyhow::Error,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error with no extra context.
    #[must_use]
    pub fn new(error: impl Into<anyhow::Error>) -> Self {
        Self {
            error: error.into(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into a user-facing [`ErrorContext`].
///
/// [`UpdateError`]s anywhere in the chain get a tailored suggestion;
/// anything else is shown as-is.
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let Some(update_error) = error.chain().find_map(|e| e.downcast_ref::<UpdateError>()).cloned()
    else {
        return ErrorContext::new(error);
    };

    let ctx = ErrorContext::new(error);
    match update_error {
        UpdateError::Network { .. } | UpdateError::DownloadFailed { .. } => ctx
            .with_suggestion("Check your internet connection and try again")
            .with_details("The release server could not be reached or the transfer was interrupted"),
        UpdateError::IntegrityMismatch { .. } => ctx
            .with_suggestion("Try again later; if this persists, download the release manually")
            .with_details(
                "The downloaded file did not match the published checksum and was deleted",
            ),
        UpdateError::UnsupportedPlatform { .. } | UpdateError::AssetNotFound { .. } => ctx
            .with_suggestion("Download the latest release manually from the project page")
            .with_details("Nothing on disk was changed"),
        UpdateError::InstallInProgress { .. } => ctx
            .with_suggestion("Run `monolith recover` to restore the previous version, then retry"),
        UpdateError::BackupFailed { .. } => ctx
            .with_suggestion("Close other running instances of the application and try again")
            .with_details("Nothing on disk was changed"),
        UpdateError::ExtractionFailed { .. }
        | UpdateError::BinaryNotFound { .. }
        | UpdateError::SwapFailed { .. } => ctx
            .with_suggestion("Ensure no other instances are running and try again")
            .with_details("The previous version was restored"),
        UpdateError::PermissionElevationRequired { .. } => ctx
            .with_suggestion("Re-run the update as Administrator / with sudo")
            .with_details("The backup was kept so an elevated run can finish the install"),
        UpdateError::RollbackFailed { backup, path, .. } => ctx
            .with_suggestion(format!(
                "Rename {} to {} to restore the previous version",
                backup.display(),
                path.display()
            ))
            .with_details("The update failed and the automatic restore did not complete"),
        UpdateError::InvalidRelease { .. } => {
            ctx.with_details("The release server returned data in an unexpected format")
        }
        UpdateError::FileSystem { .. } => {
            ctx.with_suggestion("Check that the path exists and is writable")
        }
        UpdateError::Config { .. } => ctx.with_suggestion(format!(
            "Check the updater config file or set {}",
            crate::constants::CONFIG_DIR_ENV
        )),
        UpdateError::Restart { .. } => {
            ctx.with_suggestion("Please restart the application manually")
        }
    }
}
