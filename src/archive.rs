//! Archive builder.
//!
//! Streams the included files of a [`Selection`] into a zip archive. The
//! archive is written to a temporary file next to the destination and only
//! renamed into place once every entry has been written, so a failed build
//! never leaves a usable partial archive behind.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime as ZipDateTime, ZipWriter};

use crate::error::PackagingError;
use crate::models::{Archive, ArchiveEntry, Selection};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflate,
    Zstd,
    Stored,
}

impl Compression {
    fn method(self) -> CompressionMethod {
        match self {
            Compression::Deflate => CompressionMethod::Deflated,
            Compression::Zstd => CompressionMethod::Zstd,
            Compression::Stored => CompressionMethod::Stored,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ArchiveOptions {
    #[serde(default)]
    pub compression: Compression,
}

/// Package the included entries of `selection` into `dest`.
///
/// Entries are written in selection order with forward-slash names. Any
/// read or write failure aborts the whole build and removes the temporary
/// file; `dest` is only created on success.
pub fn build(
    selection: &Selection,
    dest: &Path,
    options: &ArchiveOptions,
) -> Result<Archive, PackagingError> {
    let write_err = |source| PackagingError::Write {
        path: dest.to_path_buf(),
        source,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix(".workstate-")
        .suffix(".zip.part")
        .tempfile_in(&parent)
        .map_err(write_err)?;

    let mut zip = ZipWriter::new(tmp);
    let mut entries = Vec::new();

    for entry in selection.included() {
        let mut file = File::open(&entry.abs_path).map_err(|source| PackagingError::Read {
            path: entry.abs_path.clone(),
            source,
        })?;
        let meta = file.metadata().map_err(|source| PackagingError::Read {
            path: entry.abs_path.clone(),
            source,
        })?;

        let file_options = SimpleFileOptions::default()
            .compression_method(options.compression.method())
            .unix_permissions(permission_bits(&meta))
            .large_file(meta.len() > u32::MAX as u64)
            .last_modified_time(zip_time(meta.modified().ok()));

        zip.start_file(entry.rel_path.as_str(), file_options)
            .map_err(|source| PackagingError::Zip {
                entry: entry.rel_path.clone(),
                source,
            })?;

        let written = io::copy(&mut file, &mut zip).map_err(|source| PackagingError::Read {
            path: entry.abs_path.clone(),
            source,
        })?;
        debug!(entry = %entry.rel_path, bytes = written, "archived");

        entries.push(ArchiveEntry {
            path: entry.rel_path.clone(),
            size: written,
        });
    }

    let tmp = zip.finish().map_err(|source| PackagingError::Zip {
        entry: String::new(),
        source,
    })?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(dest).map_err(|e| write_err(e.error))?;

    let compressed_size = fs::metadata(dest).map_err(write_err)?.len();
    let sha256 = hash_file(dest).map_err(write_err)?;

    info!(
        archive = %dest.display(),
        files = entries.len(),
        bytes = compressed_size,
        "archive built"
    );

    Ok(Archive {
        path: dest.to_path_buf(),
        entries,
        compressed_size,
        sha256,
    })
}

/// Hex SHA-256 of a file, streamed.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

fn zip_time(modified: Option<SystemTime>) -> ZipDateTime {
    let Some(mtime) = modified else {
        return ZipDateTime::default();
    };
    let dt: chrono::DateTime<Local> = mtime.into();
    // Zip timestamps cannot represent years before 1980 or after 2107.
    let year = u16::try_from(dt.year()).unwrap_or(0);
    ZipDateTime::from_date_and_time(
        year,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    )
    .unwrap_or_default()
}

#[cfg(unix)]
fn permission_bits(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(_meta: &fs::Metadata) -> u32 {
    0o644
}
