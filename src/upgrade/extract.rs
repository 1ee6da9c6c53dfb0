//! Archive extraction into the staging directory.
//!
//! The format is chosen from the asset's file extension. Entries that would
//! land outside the staging directory (absolute paths, `..` components) are
//! never written: zip entries go through the crate's enclosed-name check and
//! tar entries are unpacked with `unpack_in` semantics.

use flate2::read::GzDecoder;
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use crate::core::{Result, UpdateError};

/// Release asset formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz` / `.tgz`
    TarGz,
    /// `.dmg`, installed manually by the user
    DiskImage,
}

impl ArchiveKind {
    /// Detect the format from a file name.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".dmg") {
            Some(Self::DiskImage)
        } else {
            None
        }
    }
}

/// Delete and recreate the staging directory.
///
/// Staging contents are never reused across attempts.
pub async fn prepare_staging(staging: &Path) -> Result<()> {
    let failed = |reason: String| UpdateError::ExtractionFailed {
        archive: staging.to_path_buf(),
        reason,
    };

    if fs::try_exists(staging).await.unwrap_or(false) {
        debug!("Clearing staging directory {:?}", staging);
        fs::remove_dir_all(staging)
            .await
            .map_err(|e| failed(format!("failed to clear staging directory: {e}")))?;
    }
    fs::create_dir_all(staging)
        .await
        .map_err(|e| failed(format!("failed to create staging directory: {e}")))
}

/// Remove the staging directory, ignoring a missing one.
pub async fn remove_staging(staging: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(staging).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Unpack `archive` into `staging`.
///
/// Runs on the blocking pool. Disk images cannot be unpacked and are
/// rejected.
pub async fn extract_archive(archive: &Path, kind: ArchiveKind, staging: &Path) -> Result<()> {
    let archive_buf = archive.to_path_buf();
    let staging_buf = staging.to_path_buf();

    let result = tokio::task::spawn_blocking(move || match kind {
        ArchiveKind::Zip => extract_zip(&archive_buf, &staging_buf),
        ArchiveKind::TarGz => extract_tar_gz(&archive_buf, &staging_buf),
        ArchiveKind::DiskImage => Err("disk images cannot be extracted".to_string()),
    })
    .await
    .map_err(|e| format!("extraction task failed: {e}"))
    .and_then(|inner| inner);

    result.map_err(|reason| UpdateError::ExtractionFailed {
        archive: archive.to_path_buf(),
        reason,
    })
}

fn extract_zip(archive: &Path, staging: &Path) -> std::result::Result<(), String> {
    let file = File::open(archive).map_err(|e| e.to_string())?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| e.to_string())?;
    debug!("Extracting {} zip entries into {:?}", zip.len(), staging);
    zip.extract(staging).map_err(|e| e.to_string())
}

fn extract_tar_gz(archive: &Path, staging: &Path) -> std::result::Result<(), String> {
    let file = File::open(archive).map_err(|e| e.to_string())?;
    let mut tar = tar::Archive::new(GzDecoder::new(file));
    tar.set_preserve_permissions(true);
    debug!("Extracting tarball into {:?}", staging);
    tar.unpack(staging).map_err(|e| e.to_string())
}

/// Locate the application binary among the extracted files.
///
/// Prefers a regular file named `preferred` anywhere in the tree; otherwise
/// takes the first regular file whose name does not start with a dot. The
/// walk is sorted, so the choice is deterministic.
pub fn find_executable(staging: &Path, preferred: &OsStr) -> Option<PathBuf> {
    let files: Vec<PathBuf> = WalkDir::new(staging)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .collect();

    files.iter().find(|path| path.file_name() == Some(preferred)).cloned().or_else(|| {
        files
            .into_iter()
            .find(|path| path.file_name().is_some_and(|name| !name.to_string_lossy().starts_with('.')))
    })
}
