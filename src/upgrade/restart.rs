//! Relaunching the application after an update.
//!
//! None of these functions wait for the started process to finish. After a relaunch
//! or elevation request the caller is expected to exit; the new process owns
//! whatever comes next.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

use crate::core::{Result, UpdateError};

/// Starts the application again, optionally with elevated privileges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartSupervisor {
    program: PathBuf,
    args: Vec<OsString>,
}

impl RestartSupervisor {
    /// Supervisor relaunching `program` with `args` (without `argv[0]`).
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Executable that will be started.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to it.
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// The command [`relaunch`](Self::relaunch) spawns.
    pub fn relaunch_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }

    /// Start the application again and return the child's pid.
    pub fn relaunch(&self) -> Result<u32> {
        info!("Relaunching {:?}", self.program);
        let child = self.relaunch_command().spawn().map_err(|e| UpdateError::Restart {
            reason: format!("failed to start {}: {e}", self.program.display()),
        })?;
        Ok(child.id())
    }

    /// Whether this host can start a process with elevated privileges.
    pub fn elevation_supported() -> bool {
        cfg!(windows)
    }

    /// Ask the OS to run `program` with `args` as administrator.
    ///
    /// `program` must carry an executable extension. The PowerShell wrapper
    /// returns once the elevated process has started, so this does not wait
    /// for it. Returns `Ok(false)` when the host has no elevation mechanism,
    /// or when the request was refused (declined prompt, unlaunchable
    /// program); the caller then has to report the permission problem.
    pub fn request_elevation(program: &Path, args: &[OsString]) -> Result<bool> {
        if !Self::elevation_supported() {
            warn!("Elevation is not supported on this platform");
            return Ok(false);
        }

        info!("Requesting elevation for {:?}", program);
        let script = elevation_script(program, args);
        let status = Command::new("powershell")
            .args(["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", &script])
            .status()
            .map_err(|e| UpdateError::Restart {
                reason: format!("failed to request elevation: {e}"),
            })?;

        if !status.success() {
            warn!("Elevation request for {:?} was refused ({})", program, status);
            return Ok(false);
        }
        Ok(true)
    }

    /// Open a downloaded disk image for a manual install.
    ///
    /// Returns `Ok(false)` on hosts that have no disk-image handler.
    pub fn reveal_disk_image(image: &Path) -> Result<bool> {
        if !cfg!(target_os = "macos") {
            warn!("Cannot open disk image {:?} on this platform", image);
            return Ok(false);
        }

        info!("Opening {:?}", image);
        Command::new("open").arg(image).spawn().map_err(|e| UpdateError::Restart {
            reason: format!("failed to open {}: {e}", image.display()),
        })?;
        Ok(true)
    }
}

/// PowerShell command line that starts `program` elevated without waiting.
pub fn elevation_script(program: &Path, args: &[OsString]) -> String {
    let mut script = format!("Start-Process -FilePath {}", ps_quote(program.as_os_str()));
    if !args.is_empty() {
        let list: Vec<String> = args.iter().map(|arg| ps_quote(arg)).collect();
        script.push_str(&format!(" -ArgumentList @({})", list.join(",")));
    }
    script.push_str(" -Verb RunAs -ErrorAction Stop");
    script
}

fn ps_quote(value: &OsStr) -> String {
    format!("'{}'", value.to_string_lossy().replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relaunch_command_repeats_arguments() {
        let supervisor =
            RestartSupervisor::new("/opt/monolith/monolith", vec!["--verbose".into(), "status".into()]);

        let command = supervisor.relaunch_command();

        assert_eq!(command.get_program(), "/opt/monolith/monolith");
        let args: Vec<&OsStr> = command.get_args().collect();
        assert_eq!(args, ["--verbose", "status"]);
    }

    #[test]
    fn test_elevation_script_quotes_arguments() {
        let script = elevation_script(
            Path::new(r"C:\Users\o'neil\AppData\Roaming\monolith\monolith-elevate.exe"),
            &["upgrade".into(), "--resume".into(), r"C:\Program Files\Monolith\update.zip".into()],
        );

        assert_eq!(
            script,
            r"Start-Process -FilePath 'C:\Users\o''neil\AppData\Roaming\monolith\monolith-elevate.exe' -ArgumentList @('upgrade','--resume','C:\Program Files\Monolith\update.zip') -Verb RunAs -ErrorAction Stop"
        );
        assert!(!script.contains("-Wait"));
    }

    #[test]
    fn test_elevation_script_without_arguments() {
        let script = elevation_script(Path::new("Monolith.exe"), &[]);
        assert_eq!(script, "Start-Process -FilePath 'Monolith.exe' -Verb RunAs -ErrorAction Stop");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_elevation_is_unavailable_off_windows() {
        let requested = RestartSupervisor::request_elevation(Path::new("/bin/true"), &[]).unwrap();
        assert!(!requested);
    }
}
