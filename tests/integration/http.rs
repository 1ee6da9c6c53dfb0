//! The HTTP transport against a local server.

use monolith_updater::core::UpdateError;
use monolith_updater::test_utils::InstallFixture;
use monolith_updater::upgrade::asset::Platform;
use monolith_updater::upgrade::config::UpgradeConfig;
use monolith_updater::upgrade::transport::{HttpTransport, Transport};
use monolith_updater::upgrade::{SelfUpdater, UpdateOutcome};
use std::time::Duration;

use crate::server::{TestServer, publish_release};

fn config_for(server: &TestServer) -> UpgradeConfig {
    UpgradeConfig {
        version_url: server.url("/version.txt"),
        release_url: server.url("/release.json"),
        asset_prefix: "app".to_string(),
        retry_delay_ms: 0,
        ..UpgradeConfig::default()
    }
}

fn updater(fx: &InstallFixture, server: &TestServer) -> SelfUpdater {
    let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();
    SelfUpdater::new(transport, fx.paths.clone(), config_for(server))
        .with_current_version(InstallFixture::CURRENT_VERSION)
        .with_platform(Platform::Linux)
}

#[tokio::test]
async fn test_http_update_end_to_end() {
    let server = TestServer::start().await;
    publish_release(&server, "1.2.0", b"served over http");
    let fx = InstallFixture::new();

    let outcome = updater(&fx, &server).update(None).await;

    assert_eq!(
        outcome,
        UpdateOutcome::Updated {
            version: "1.2.0".to_string(),
            install_path: fx.paths.install_path().to_path_buf(),
        }
    );
    assert_eq!(fx.installed(), b"served over http");
    assert_eq!(server.hits("/download/app-linux.tar.gz"), 1);
    assert!(!fx.paths.lock_path().exists());
}

#[tokio::test]
async fn test_http_latest_version_is_trimmed_and_unprefixed() {
    let server = TestServer::start().await;
    server.serve("/version.txt", "  V2.0.1\r\n");
    let fx = InstallFixture::new();

    let latest = updater(&fx, &server).fetch_latest_version().await.unwrap();

    assert_eq!(latest, "2.0.1");
}

#[tokio::test]
async fn test_http_error_status_is_a_network_error() {
    let server = TestServer::start().await;
    let transport = HttpTransport::new(Duration::from_secs(5)).unwrap();

    let err = transport.get_text(&server.url("/missing")).await.unwrap_err();

    assert!(err.is_retryable());
    match err {
        UpdateError::Network {
            url,
            reason,
        } => {
            assert!(url.ends_with("/missing"));
            assert!(reason.contains("404"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_http_unreachable_release_leaves_install_untouched() {
    let server = TestServer::start().await;
    server.serve("/version.txt", "9.9.9");
    let fx = InstallFixture::new();

    let outcome = updater(&fx, &server).update(None).await;

    assert!(matches!(
        outcome,
        UpdateOutcome::Failed {
            error: UpdateError::Network { .. }
        }
    ));
    assert_eq!(fx.installed(), InstallFixture::OLD_BINARY);
    assert!(fx.config_dir_entries().is_empty());
}
