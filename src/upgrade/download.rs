//! Resilient asset download with integrity verification.
//!
//! Transfers are retried a bounded number of times with a fixed pause in
//! between, and only for transport failures. A checksum mismatch is final:
//! the same URL would serve the same bytes again.
//!
//! Every failed attempt removes its own partial output, so after any error
//! return the destination path does not exist.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_DOWNLOAD_ATTEMPTS, DEFAULT_RETRY_DELAY};
use crate::core::{Result, UpdateError};
use crate::upgrade::transport::Transport;
use crate::upgrade::verification::ChecksumVerifier;

/// Bytes transferred so far, against the expected total when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written to disk in the current attempt.
    pub downloaded: u64,
    /// Expected size from the response's length hint.
    pub total: Option<u64>,
}

impl DownloadProgress {
    /// Completion percentage, when the total is known and non-zero.
    #[must_use]
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.downloaded as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// Receives progress updates during a transfer. May borrow from the caller.
pub type ProgressCallback<'a> = dyn Fn(DownloadProgress) + Send + Sync + 'a;

/// Streams a URL to a file with retries and optional checksum verification.
pub struct SecureDownloader<'t, T: Transport> {
    transport: &'t T,
    max_attempts: usize,
    retry_delay: Duration,
}

impl<'t, T: Transport> SecureDownloader<'t, T> {
    /// Downloader with the default retry policy (3 attempts, 2 s apart).
    pub fn new(transport: &'t T) -> Self {
        Self {
            transport,
            max_attempts: DEFAULT_DOWNLOAD_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Override the retry policy. At least one attempt is always made.
    #[must_use]
    pub fn with_retry(mut self, max_attempts: usize, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    /// Download `url` to `dest`, verifying it against `expected_sha256`.
    ///
    /// # Errors
    ///
    /// - [`UpdateError::DownloadFailed`] once every attempt failed with a
    ///   transport error
    /// - [`UpdateError::IntegrityMismatch`] when the bytes do not match the
    ///   expected digest; not retried
    /// - [`UpdateError::FileSystem`] when the destination cannot be written
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        expected_sha256: Option<&str>,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<PathBuf> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| UpdateError::fs("create download directory", parent, &e))?;
        }

        info!("Downloading {} to {:?}", url, dest);
        let attempts = AtomicUsize::new(0);
        let strategy = FixedInterval::new(self.retry_delay).take(self.max_attempts - 1);

        let transferred = RetryIf::start(
            strategy,
            || {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                debug!("Download attempt {}/{} for {}", attempt, self.max_attempts, url);
                self.attempt(url, dest, progress)
            },
            |err: &UpdateError| {
                let retry = err.is_retryable();
                if retry {
                    warn!("Download attempt failed: {}. Retrying...", err);
                }
                retry
            },
        )
        .await;

        let bytes = match transferred {
            Ok(bytes) => bytes,
            Err(UpdateError::Network { reason, .. }) => {
                let attempts = attempts.load(Ordering::SeqCst);
                warn!("Download failed after {} attempts: {}", attempts, reason);
                return Err(UpdateError::DownloadFailed {
                    url: url.to_string(),
                    attempts,
                    reason,
                });
            }
            Err(err) => return Err(err),
        };
        debug!("Downloaded {} bytes from {}", bytes, url);

        if let Some(expected) = expected_sha256 {
            if let Err(err) = ChecksumVerifier::verify_checksum(dest, expected).await {
                remove_partial(dest).await;
                return Err(match err {
                    UpdateError::IntegrityMismatch {
                        expected,
                        actual,
                        ..
                    } => UpdateError::IntegrityMismatch {
                        asset: url.rsplit('/').next().unwrap_or(url).to_string(),
                        expected,
                        actual,
                    },
                    other => other,
                });
            }
        }

        Ok(dest.to_path_buf())
    }

    /// One transfer; removes its partial output on failure.
    async fn attempt(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64> {
        let result = self.transfer(url, dest, progress).await;
        if result.is_err() {
            remove_partial(dest).await;
        }
        result
    }

    async fn transfer(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback<'_>>,
    ) -> Result<u64> {
        let mut response = self.transport.get_stream(url).await?;
        let total = response.content_length;

        let mut file =
            File::create(dest).await.map_err(|e| UpdateError::fs("create download", dest, &e))?;

        let mut downloaded = 0u64;
        if let Some(report) = progress {
            report(DownloadProgress {
                downloaded,
                total,
            });
        }

        while let Some(chunk) = response.body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await.map_err(|e| UpdateError::fs("write download", dest, &e))?;
            downloaded += chunk.len() as u64;

            if let Some(report) = progress {
                report(DownloadProgress {
                    downloaded,
                    total,
                });
            }
        }

        file.flush().await.map_err(|e| UpdateError::fs("flush download", dest, &e))?;
        file.sync_all().await.map_err(|e| UpdateError::fs("sync download", dest, &e))?;
        Ok(downloaded)
    }
}

async fn remove_partial(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed partial download {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial download {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{FakeTransport, sha256_hex};
    use std::sync::Mutex;
    use tempfile::TempDir;

    const URL: &str = "https://example.com/releases/app-linux.tar.gz";

    fn downloader(transport: &FakeTransport) -> SecureDownloader<'_, FakeTransport> {
        SecureDownloader::new(transport).with_retry(3, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_download_writes_body_and_reports_progress() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("update_temp_app-linux.tar.gz");
        let body = vec![7u8; 20_000];
        let transport = FakeTransport::new().with_file(URL, body.clone());

        let seen = Mutex::new(Vec::new());
        let report = |p: DownloadProgress| seen.lock().unwrap().push(p);

        let path = downloader(&transport)
            .download(URL, &dest, Some(&sha256_hex(&body)), Some(&report))
            .await
            .unwrap();

        assert_eq!(std::fs::read(path).unwrap(), body);
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first().unwrap().downloaded, 0);
        let last = seen.last().unwrap();
        assert_eq!(last.downloaded, 20_000);
        assert_eq!(last.total, Some(20_000));
        assert_eq!(last.percent(), Some(100.0));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("archive");
        let transport = FakeTransport::new().with_file(URL, b"payload".to_vec()).failing_first(URL, 2);

        downloader(&transport).download(URL, &dest, None, None).await.unwrap();

        assert_eq!(transport.request_count(URL), 3);
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_exhausted_retries_leave_no_partial_file() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("archive");
        let transport =
            FakeTransport::new().with_file(URL, vec![1u8; 4096]).truncating_body(URL, 100);

        let err = downloader(&transport).download(URL, &dest, None, None).await.unwrap_err();

        assert!(matches!(err, UpdateError::DownloadFailed { attempts: 3, .. }));
        assert_eq!(transport.request_count(URL), 3);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_not_retried_and_cleans_up() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("archive");
        let transport = FakeTransport::new().with_file(URL, b"tampered".to_vec());

        let err = downloader(&transport)
            .download(URL, &dest, Some(&sha256_hex(b"original")), None)
            .await
            .unwrap_err();

        assert!(
            matches!(err, UpdateError::IntegrityMismatch { ref asset, .. } if asset == "app-linux.tar.gz")
        );
        assert_eq!(transport.request_count(URL), 1);
        assert!(!dest.exists());
    }
}
