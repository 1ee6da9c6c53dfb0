//! The update pipeline through the public API, per platform.

use monolith_updater::core::UpdateError;
use monolith_updater::test_utils::{
    FakeTransport, InstallFixture, init_test_logging, sha256_hex, tar_gz_archive, zip_archive,
};
use monolith_updater::upgrade::asset::Platform;
use monolith_updater::upgrade::version_check::VersionChecker;
use monolith_updater::upgrade::{SelfUpdater, UpdateOutcome};

fn publishing(version: &str, asset_name: &str, archive: Vec<u8>) -> FakeTransport {
    let digest = sha256_hex(&archive);
    FakeTransport::new()
        .with_text(InstallFixture::VERSION_URL, version)
        .with_text(
            InstallFixture::RELEASE_URL,
            &InstallFixture::release_json(version, asset_name, Some(&digest)),
        )
        .with_file(&InstallFixture::asset_url(asset_name), archive)
}

fn updater_for(fx: &InstallFixture, transport: FakeTransport, platform: Platform) -> SelfUpdater<FakeTransport> {
    SelfUpdater::new(transport, fx.paths.clone(), fx.config())
        .with_current_version(InstallFixture::CURRENT_VERSION)
        .with_platform(platform)
}

#[tokio::test]
async fn test_windows_zip_with_nested_folder_is_installed() {
    init_test_logging(None);
    let fx = InstallFixture::new();
    let archive = zip_archive(&[
        ("Monolith/README.txt", b"read me".as_slice()),
        ("Monolith/monolith", b"windows build".as_slice()),
    ]);
    let updater = updater_for(&fx, publishing("2.0.0", "app-windows.zip", archive), Platform::Windows);

    let outcome = updater.update(None).await;

    assert!(matches!(outcome, UpdateOutcome::Updated { .. }), "{outcome:?}");
    assert_eq!(fx.installed(), b"windows build");
}

#[tokio::test]
async fn test_archive_with_differently_named_binary_still_installs() {
    let fx = InstallFixture::new();
    let archive = tar_gz_archive(&[("Monolith-x86_64", b"renamed build".as_slice())]);
    let updater =
        updater_for(&fx, publishing("2.0.0", InstallFixture::ASSET_NAME, archive), Platform::Linux);

    assert!(matches!(updater.update(None).await, UpdateOutcome::Updated { .. }));
    assert_eq!(fx.installed(), b"renamed build");
}

#[tokio::test]
async fn test_macos_disk_image_is_left_for_manual_install() {
    let fx = InstallFixture::new();
    let image = b"not really a disk image".to_vec();
    let updater = updater_for(&fx, publishing("2.0.0", "app-macos.dmg", image.clone()), Platform::MacOs);

    let outcome = updater.update(None).await;

    let UpdateOutcome::ManualInstall {
        version,
        image: path,
    } = outcome
    else {
        panic!("expected a manual install, got {outcome:?}");
    };
    assert_eq!(version, "2.0.0");
    assert_eq!(std::fs::read(&path).unwrap(), image);
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(!fx.paths.lock_path().exists());
    assert!(!fx.paths.backup_path().exists());
}

#[tokio::test]
async fn test_archive_without_files_rolls_back() {
    let fx = InstallFixture::new();
    let archive = tar_gz_archive(&[]);
    let updater =
        updater_for(&fx, publishing("2.0.0", InstallFixture::ASSET_NAME, archive), Platform::Linux);

    let outcome = updater.update(None).await;

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            error: UpdateError::BinaryNotFound { .. }
        }
    ));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(!fx.paths.lock_path().exists());
    assert!(!fx.paths.staging_dir().exists());
    assert!(!fx.paths.temp_archive_path(InstallFixture::ASSET_NAME).exists());
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let fx = InstallFixture::new();
    let url = InstallFixture::asset_url(InstallFixture::ASSET_NAME);
    let transport = InstallFixture::transport_for("2.0.0", b"new build").failing_first(&url, 2);
    let updater = fx.updater(transport);

    assert!(matches!(updater.update(None).await, UpdateOutcome::Updated { .. }));
    assert_eq!(fx.installed(), b"new build");
}

#[tokio::test]
async fn test_truncated_downloads_never_reach_the_installer() {
    let fx = InstallFixture::new();
    let url = InstallFixture::asset_url(InstallFixture::ASSET_NAME);
    let transport = InstallFixture::transport_for("2.0.0", b"new build").truncating_body(&url, 10);
    let updater = fx.updater(transport);

    let outcome = updater.update(None).await;

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            error: UpdateError::DownloadFailed { attempts: 3, .. }
        }
    ));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(fx.config_dir_entries().is_empty());
}

#[tokio::test]
async fn test_unparsable_remote_version_is_not_an_update() {
    let fx = InstallFixture::new();
    let updater = fx.updater(InstallFixture::transport_for("latest", b"new build"));

    assert!(matches!(updater.update(None).await, UpdateOutcome::UpToDate { .. }));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
}

#[tokio::test]
async fn test_cached_check_is_cleared_by_an_update() {
    let fx = InstallFixture::new();
    let updater = fx.updater(InstallFixture::transport_for("2.0.0", b"new build"));

    let latest = VersionChecker::new(&updater).check_now().await.unwrap();
    assert_eq!(latest.as_deref(), Some("2.0.0"));
    assert!(fx.paths.version_cache_file().exists());

    assert!(matches!(updater.update(None).await, UpdateOutcome::Updated { .. }));
    assert!(!fx.paths.version_cache_file().exists());
}
