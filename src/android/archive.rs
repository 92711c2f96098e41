//! Reading entries out of split-package bundles.
//!
//! A `.apks` bundle is a plain ZIP holding `base.apk` and the split packages
//! next to it. Only single-entry extraction is needed here; repacking is left
//! to the external toolchain.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;
use zip::read::ZipArchive;

/// Result alias for bundle operations.
pub type ArchiveResult<T> = Result<T, ArchiveError>;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("entry '{entry}' not found in {}", .archive.display())]
    MissingEntry { archive: PathBuf, entry: String },

    #[error("{0}")]
    InvalidInput(String),
}

/// Extracts `entry` into `dest_dir`, overwriting any file of the same name.
///
/// Only the final path component of the entry is kept, so nested entries land
/// directly in `dest_dir`.
pub fn extract_entry(archive: impl AsRef<Path>, entry: &str, dest_dir: impl AsRef<Path>) -> ArchiveResult<PathBuf> {
    let archive = archive.as_ref();
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut file = match zip.by_name(entry) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(ArchiveError::MissingEntry {
                archive: archive.to_path_buf(),
                entry: entry.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let name = file
        .enclosed_name()
        .and_then(|p| p.file_name().map(|n| n.to_os_string()))
        .ok_or_else(|| ArchiveError::InvalidInput(format!("unsafe entry name '{entry}'")))?;
    let dest_dir = dest_dir.as_ref();
    fs::create_dir_all(dest_dir)?;
    let dest = dest_dir.join(name);

    let mut out = File::create(&dest)?;
    let written = io::copy(&mut file, &mut out)?;
    debug!("extracted {entry} ({written} bytes) to {}", dest.display());
    Ok(dest)
}
