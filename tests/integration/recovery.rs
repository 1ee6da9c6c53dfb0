//! Interrupted installs, restarts and rollbacks.

use monolith_updater::core::UpdateError;
use monolith_updater::test_utils::{FakeTransport, InstallFixture};
use monolith_updater::upgrade::backup::BackupManager;
use monolith_updater::upgrade::installer::PermissionProbe;
use monolith_updater::upgrade::lock::InstallLock;
use monolith_updater::upgrade::{RecoveryOutcome, UpdateOutcome, recover_interrupted_install};
use std::path::Path;
use std::sync::Arc;

struct ReadOnlyInstallDir;

impl PermissionProbe for ReadOnlyInstallDir {
    fn check(&self, _probe_path: &Path) -> std::io::Result<()> {
        Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied))
    }
}

/// Leave the state a crash right after the backup would leave.
async fn crash_after_backup(fx: &InstallFixture) {
    InstallLock::new(fx.paths.lock_path()).acquire().await.unwrap();
    BackupManager::for_paths(&fx.paths).create_backup().await.unwrap();
}

#[tokio::test]
async fn test_crash_with_missing_executable_is_restored() {
    let fx = InstallFixture::new();
    crash_after_backup(&fx).await;
    assert!(!fx.paths.install_path().exists());

    let outcome = recover_interrupted_install(&fx.paths).await;

    assert_eq!(
        outcome,
        RecoveryOutcome::Restored {
            backup: fx.paths.backup_path(),
        }
    );
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(!fx.paths.lock_path().exists());
}

#[tokio::test]
async fn test_recovery_then_update_succeeds() {
    let fx = InstallFixture::new();
    crash_after_backup(&fx).await;
    std::fs::write(fx.paths.install_path(), b"partial").unwrap();

    recover_interrupted_install(&fx.paths).await;
    let outcome = fx.updater(InstallFixture::transport_for("2.0.0", b"new build")).update(None).await;

    assert!(matches!(outcome, UpdateOutcome::Updated { .. }));
    assert_eq!(fx.installed(), b"new build");
}

#[tokio::test]
async fn test_update_refuses_to_run_over_a_leftover_lock() {
    let fx = InstallFixture::new();
    InstallLock::new(fx.paths.lock_path()).acquire().await.unwrap();

    let outcome = fx.updater(InstallFixture::transport_for("2.0.0", b"new build")).update(None).await;

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            error: UpdateError::InstallInProgress { .. }
        }
    ));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(fx.paths.lock_path().exists());
}

#[tokio::test]
async fn test_halted_install_is_undone_by_the_next_startup() {
    let fx = InstallFixture::new();
    let updater = fx
        .updater(InstallFixture::transport_for("2.0.0", b"new build"))
        .with_probe(Arc::new(ReadOnlyInstallDir));
    assert!(matches!(updater.update(None).await, UpdateOutcome::ElevationRequested { .. }));
    assert!(!fx.paths.install_path().exists());

    let outcome = recover_interrupted_install(&fx.paths).await;

    assert!(matches!(outcome, RecoveryOutcome::Restored { .. }));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(!fx.paths.lock_path().exists());
}

#[tokio::test]
async fn test_rollback_is_refused_during_an_install() {
    let fx = InstallFixture::new();
    crash_after_backup(&fx).await;

    let err = fx.updater(FakeTransport::new()).rollback().await.unwrap_err();

    assert!(matches!(err, UpdateError::InstallInProgress { .. }));
    assert!(fx.paths.backup_path().exists());
}

#[tokio::test]
async fn test_rollback_without_backup_fails() {
    let fx = InstallFixture::new();

    let err = fx.updater(FakeTransport::new()).rollback().await.unwrap_err();

    assert!(matches!(err, UpdateError::RollbackFailed { .. }));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
}
