//! The `monolith` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::server::{TestServer, publish_release};

fn monolith(config_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("monolith").unwrap();
    cmd.env("MONOLITH_CONFIG_DIR", config_dir)
        .env("MONOLITH_NO_PROGRESS", "1")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();

    monolith(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("upgrade"))
        .stdout(predicate::str::contains("recover"))
        .stdout(predicate::str::contains("--resume").not());
}

#[test]
fn test_version_flag() {
    let temp = TempDir::new().unwrap();

    monolith(temp.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_no_command_prints_version_without_network() {
    let temp = TempDir::new().unwrap();

    monolith(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Monolith {}", env!("CARGO_PKG_VERSION"))));
    assert!(temp.path().join("error.log").exists());
}

#[test]
fn test_recover_clears_stale_lock() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("update.lock"), b"pid=1").unwrap();

    monolith(temp.path())
        .arg("recover")
        .assert()
        .success()
        .stderr(predicate::str::contains("stale update lock"));
    assert!(!temp.path().join("update.lock").exists());
}

#[test]
fn test_recover_with_nothing_to_do() {
    let temp = TempDir::new().unwrap();

    monolith(temp.path())
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("No interrupted update found"));
}

#[test]
fn test_startup_restores_interrupted_install() {
    let temp = TempDir::new().unwrap();
    let config_dir = temp.path().join("config");
    let install = temp.path().join("monolith");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("update.lock"), b"pid=1").unwrap();
    std::fs::write(temp.path().join("monolith.old"), b"old build").unwrap();

    monolith(&config_dir)
        .args(["upgrade", "--rollback", "--install-path"])
        .arg(&install)
        .assert()
        .failure()
        .stderr(predicate::str::contains("previous version was restored"));

    // Recovery restored the backup, so the rollback that followed had none.
    assert_eq!(std::fs::read(&install).unwrap(), b"old build");
    assert!(!config_dir.join("update.lock").exists());
}

#[test]
fn test_rollback_without_backup_fails() {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("monolith");
    std::fs::write(&install, b"current build").unwrap();

    monolith(&temp.path().join("config"))
        .args(["upgrade", "--rollback", "--install-path"])
        .arg(&install)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to restore from backup"));
    assert_eq!(std::fs::read(&install).unwrap(), b"current build");
}

/// An installed "current build" and a config directory whose `config.toml`
/// points at `version_url` and `release_url`.
fn installation(version_url: &str, release_url: &str) -> (TempDir, PathBuf, PathBuf) {
    let temp = TempDir::new().unwrap();
    let install = temp.path().join("monolith");
    std::fs::write(&install, b"current build").unwrap();

    let config_dir = temp.path().join("config");
    std::fs::create_dir_all(&config_dir).unwrap();
    let config = format!(
        "[upgrade]\nversion_url = \"{version_url}\"\nrelease_url = \"{release_url}\"\n\
         asset_prefix = \"app\"\nretry_delay_ms = 0\n"
    );
    std::fs::write(config_dir.join("config.toml"), config).unwrap();

    (temp, install, config_dir)
}

#[test]
fn test_check_fails_when_server_unreachable() {
    let (_temp, install, config_dir) = installation(
        "http://127.0.0.1:9/version.txt",
        "http://127.0.0.1:9/release.json",
    );

    monolith(&config_dir)
        .args(["upgrade", "--check", "--install-path"])
        .arg(&install)
        .assert()
        .failure()
        .stderr(predicate::str::contains("internet connection"));
    assert_eq!(std::fs::read(&install).unwrap(), b"current build");
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_without_terminal_requires_yes() {
    let server = TestServer::start().await;
    publish_release(&server, "99.0.0", b"new build");
    let (_temp, install, config_dir) =
        installation(&server.url("/version.txt"), &server.url("/release.json"));

    let mut cmd = monolith(&config_dir);
    cmd.args(["upgrade", "--install-path"]).arg(&install);
    let assert = tokio::task::spawn_blocking(move || cmd.assert()).await.unwrap();

    assert.failure().stderr(predicate::str::contains("--yes"));
    assert_eq!(std::fs::read(&install).unwrap(), b"current build");
    assert_eq!(server.hits("/download/app-linux.tar.gz"), 0);
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_installs_from_local_server() {
    let server = TestServer::start().await;
    publish_release(&server, "99.0.0", b"#!/bin/sh\necho new\n");
    let (temp, install, config_dir) =
        installation(&server.url("/version.txt"), &server.url("/release.json"));

    let mut cmd = monolith(&config_dir);
    cmd.args(["--no-progress", "upgrade", "--yes", "--no-restart", "--install-path"]).arg(&install);
    let assert = tokio::task::spawn_blocking(move || cmd.assert()).await.unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("Successfully updated to version 99.0.0"))
        .stdout(predicate::str::contains("Restart Monolith to use the new version"));
    assert_eq!(std::fs::read(&install).unwrap(), b"#!/bin/sh\necho new\n");
    assert_eq!(std::fs::read(temp.path().join("monolith.old")).unwrap(), b"current build");
    assert!(!config_dir.join("update.lock").exists());
    assert_eq!(server.hits("/download/app-linux.tar.gz"), 1);
}

#[cfg(target_os = "linux")]
#[tokio::test(flavor = "multi_thread")]
async fn test_upgrade_relaunches_new_version_by_default() {
    let server = TestServer::start().await;
    publish_release(&server, "99.0.0", b"#!/bin/sh\necho \"$@\" > \"$0.ran\"\n");
    let (temp, install, config_dir) =
        installation(&server.url("/version.txt"), &server.url("/release.json"));

    let mut cmd = monolith(&config_dir);
    cmd.args(["--no-progress", "upgrade", "--yes", "--install-path"]).arg(&install);
    let assert = tokio::task::spawn_blocking(move || cmd.assert()).await.unwrap();

    assert.success().stdout(predicate::str::contains("Restarting Monolith..."));

    let marker = temp.path().join("monolith.ran");
    let mut args = String::new();
    for _ in 0..50 {
        args = std::fs::read_to_string(&marker).unwrap_or_default();
        if args.ends_with('\n') {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }
    assert!(args.starts_with("--no-progress --config-dir"), "relaunched with {args:?}");
}
