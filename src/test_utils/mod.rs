//! Test helpers shared by unit and integration tests.
//!
//! Compiled for this crate's own tests and, through the `test-utils` feature,
//! for the integration suite.

pub mod archives;
pub mod fixture;
pub mod transport;

pub use archives::{tar_gz_archive, zip_archive};
pub use fixture::InstallFixture;
pub use transport::FakeTransport;

use sha2::{Digest, Sha256};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Uses `level` if given, else `RUST_LOG` if set; otherwise logging stays
/// off. Safe to call from every test.
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .try_init();
    });
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
