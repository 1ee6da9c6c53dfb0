use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use crate::constants::HASH_CHUNK_SIZE;
use crate::core::{Result, UpdateError};

/// Verifies the integrity of downloaded files using SHA-256.
///
/// Digests are computed from fixed-size chunks, so memory use does not grow
/// with the file. This is integrity checking, not authentication: the
/// expected digest comes from the same release metadata as the download URL,
/// and comparison is a plain case-insensitive string match.
pub struct ChecksumVerifier;

impl ChecksumVerifier {
    /// Compute the lowercase hex SHA-256 of a file.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use monolith_updater::upgrade::verification::ChecksumVerifier;
    /// use std::path::Path;
    ///
    /// # async fn example() -> monolith_updater::core::Result<()> {
    /// let digest = ChecksumVerifier::compute_sha256(Path::new("/tmp/update.tar.gz")).await?;
    /// println!("SHA256: {digest}");
    /// # Ok(())
    /// # }
    /// ```
    pub async fn compute_sha256(file_path: &Path) -> Result<String> {
        debug!("Computing SHA256 checksum for: {:?}", file_path);

        let mut file =
            File::open(file_path).await.map_err(|e| UpdateError::fs("hash", file_path, &e))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let read =
                file.read(&mut buffer).await.map_err(|e| UpdateError::fs("hash", file_path, &e))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Whether two hex digests are equal, ignoring case and a `sha256:` prefix.
    #[must_use]
    pub fn digests_match(expected: &str, actual: &str) -> bool {
        normalize(expected).eq_ignore_ascii_case(normalize(actual))
    }

    /// Verify a file against an expected checksum.
    ///
    /// Returns [`UpdateError::IntegrityMismatch`] naming both digests when the
    /// file does not match. The file is left in place; callers decide what to
    /// do with it.
    pub async fn verify_checksum(file_path: &Path, expected_checksum: &str) -> Result<()> {
        info!("Verifying checksum for: {:?}", file_path);

        let actual = Self::compute_sha256(file_path).await?;

        if !Self::digests_match(expected_checksum, &actual) {
            warn!(
                "Checksum verification failed for {:?}: expected {}, got {}",
                file_path, expected_checksum, actual
            );
            return Err(UpdateError::IntegrityMismatch {
                asset: file_path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                expected: normalize(expected_checksum).to_lowercase(),
                actual,
            });
        }

        info!("Checksum verification successful");
        Ok(())
    }
}

fn normalize(digest: &str) -> &str {
    let digest = digest.trim();
    digest.strip_prefix("sha256:").unwrap_or(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_compute_sha256() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Hello, World!").unwrap();

        let checksum = ChecksumVerifier::compute_sha256(temp_file.path()).await.unwrap();

        // Known SHA256 of "Hello, World!"
        assert_eq!(checksum, "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f");
    }

    #[tokio::test]
    async fn test_digest_is_stable_and_sensitive_to_one_byte() {
        let mut temp_file = NamedTempFile::new().unwrap();
        // Larger than one chunk so the streaming path is exercised.
        let mut content = vec![0x5au8; HASH_CHUNK_SIZE * 3 + 17];
        temp_file.write_all(&content).unwrap();

        let first = ChecksumVerifier::compute_sha256(temp_file.path()).await.unwrap();
        let second = ChecksumVerifier::compute_sha256(temp_file.path()).await.unwrap();
        assert_eq!(first, second);

        content[HASH_CHUNK_SIZE + 1] ^= 0x01;
        std::fs::write(temp_file.path(), &content).unwrap();
        let mutated = ChecksumVerifier::compute_sha256(temp_file.path()).await.unwrap();
        assert_ne!(first, mutated);
    }

    #[tokio::test]
    async fn test_verify_checksum_failure() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Test content").unwrap();

        let wrong_checksum = "0000000000000000000000000000000000000000000000000000000000000000";

        let err = ChecksumVerifier::verify_checksum(temp_file.path(), wrong_checksum)
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::IntegrityMismatch { expected, .. } if expected == wrong_checksum));
    }

    #[tokio::test]
    async fn test_verify_checksum_case_insensitive() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"Test").unwrap();

        // SHA256 of "Test"
        let lowercase = "532eaabd9574880dbf76b9b8cc00832c20a6ec113d682299550d7a6e0f345e25";
        let uppercase = "532EAABD9574880DBF76B9B8CC00832C20A6EC113D682299550D7A6E0F345E25";
        let prefixed = "sha256:532eaabd9574880dbf76b9b8cc00832c20a6ec113d682299550d7a6e0f345e25";

        ChecksumVerifier::verify_checksum(temp_file.path(), lowercase).await.unwrap();
        ChecksumVerifier::verify_checksum(temp_file.path(), uppercase).await.unwrap();
        ChecksumVerifier::verify_checksum(temp_file.path(), prefixed).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_is_filesystem_error() {
        let temp = tempfile::TempDir::new().unwrap();
        let err = ChecksumVerifier::compute_sha256(&temp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, UpdateError::FileSystem { .. }));
    }
}
