//! Source documents: lazy directory listing and input validation.
//!
//! ## Why lazy?
//!
//! A batch directory can hold hundreds of reports. [`DocumentSource::documents`]
//! walks the directory one entry at a time, so nothing beyond the current
//! document is held in memory and an odd entry (a sub-directory, a dangling
//! symlink, an unreadable name) is skipped without affecting its neighbours.
//! Calling it again starts a fresh listing, which makes a batch restartable.

use crate::error::IngestError;
use std::fs::ReadDir;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A directory of source documents.
#[derive(Debug, Clone)]
pub struct DocumentSource {
    dir: PathBuf,
}

impl DocumentSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new pass over the directory.
    pub fn documents(&self) -> Result<Documents, IngestError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| IngestError::SourceDirUnreadable {
            path: self.dir.clone(),
            source: e,
        })?;
        Ok(Documents { entries })
    }
}

/// Iterator over the regular files of a [`DocumentSource`].
pub struct Documents {
    entries: ReadDir,
}

impl Iterator for Documents {
    type Item = PathBuf;

    fn next(&mut self) -> Option<PathBuf> {
        loop {
            let entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            // `metadata` follows symlinks: a dangling link errors out here.
            match std::fs::metadata(&path) {
                Ok(meta) if meta.is_file() => return Some(path),
                Ok(_) => debug!("Skipping non-file entry: {}", path.display()),
                Err(e) => warn!("Skipping {}: {}", path.display(), e),
            }
        }
    }
}

/// Check that `path` exists, is readable and starts with the `%PDF` magic.
pub fn validate_pdf(path: &Path) -> Result<(), IngestError> {
    if !path.exists() {
        return Err(IngestError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            if f.read_exact(&mut magic).is_ok() && &magic != b"%PDF" {
                return Err(IngestError::NotAPdf {
                    path: path.to_path_buf(),
                    magic,
                });
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(IngestError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(IngestError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    }

    debug!("Validated PDF: {}", path.display());
    Ok(())
}
