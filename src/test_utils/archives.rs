//! In-memory release archives.

use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::{Cursor, Write};

/// A `.tar.gz` holding `entries` as executable regular files.
pub fn tar_gz_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).expect("append tar entry");
    }

    builder.into_inner().expect("finish tar").finish().expect("finish gzip")
}

/// A `.zip` holding `entries`, stored uncompressed.
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o755);

    for (path, data) in entries {
        writer.start_file(*path, options).expect("start zip entry");
        writer.write_all(data).expect("write zip entry");
    }

    writer.finish().expect("finish zip").into_inner()
}
