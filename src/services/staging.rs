use crate::error::ImportError;
use crate::models::StagedFile;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// An isolated temporary directory holding the extracted contents of one
/// archive. Exactly one staging area exists per upload; workers treat it as
/// read-only once extraction completes, and only the owner releases it.
///
/// `release` is idempotent. Dropping an unreleased area removes the
/// directory as a backstop, but callers are expected to release explicitly
/// on every exit path so removal failures surface.
pub struct StagingArea {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingArea {
    /// Creates a fresh, uniquely named staging directory under `root`.
    pub fn acquire(root: &Path) -> Result<Self, ImportError> {
        fs::create_dir_all(root).map_err(|e| {
            ImportError::Resource(format!(
                "failed to create staging root {}: {}",
                root.display(),
                e
            ))
        })?;
        let dir = tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(root)
            .map_err(|e| {
                ImportError::Resource(format!("failed to create staging directory: {}", e))
            })?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unpacks `archive` into the staging directory, preserving the relative
    /// structure recorded in the archive.
    ///
    /// Member paths are validated before anything is written: any member
    /// whose resolved path would land outside the staging directory (absolute
    /// paths, `..` components) rejects the whole archive with
    /// `ImportError::ArchivePath` and leaves the directory empty.
    pub fn extract_archive(&self, archive: &[u8]) -> Result<Vec<StagedFile>, ImportError> {
        let cursor = io::Cursor::new(archive);
        let mut zip = zip::ZipArchive::new(cursor)
            .map_err(|e| ImportError::Input(format!("failed to parse zip archive: {}", e)))?;

        // Validate every member path before writing the first byte.
        for i in 0..zip.len() {
            let entry = zip
                .by_index(i)
                .map_err(|e| ImportError::Input(format!("failed to read zip entry: {}", e)))?;
            if entry.enclosed_name().is_none() {
                return Err(ImportError::ArchivePath {
                    member: entry.name().to_string(),
                });
            }
        }

        let mut staged = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|e| ImportError::Input(format!("failed to read zip entry: {}", e)))?;
            let relative = match entry.enclosed_name() {
                Some(p) => p.to_path_buf(),
                // Checked above; a second trip means the archive changed under us.
                None => {
                    return Err(ImportError::ArchivePath {
                        member: entry.name().to_string(),
                    });
                }
            };
            let dest = self.path.join(&relative);

            if entry.is_dir() {
                fs::create_dir_all(&dest).map_err(|e| {
                    ImportError::Resource(format!(
                        "failed to create directory {}: {}",
                        dest.display(),
                        e
                    ))
                })?;
                continue;
            }

            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent).map_err(|e| {
                    ImportError::Resource(format!(
                        "failed to create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }

            let mut out = fs::File::create(&dest).map_err(|e| {
                ImportError::Resource(format!("failed to create {}: {}", dest.display(), e))
            })?;
            let written = io::copy(&mut entry, &mut out).map_err(|e| {
                ImportError::Resource(format!("failed to write {}: {}", dest.display(), e))
            })?;

            staged.push(StagedFile {
                source_name: entry.name().to_string(),
                local_path: dest,
                size_bytes: written,
            });
        }

        Ok(staged)
    }

    /// Recursively removes the staging directory. A second call on an
    /// already-released area is a no-op.
    pub fn release(&mut self) -> Result<(), ImportError> {
        if let Some(dir) = self.dir.take() {
            dir.close().map_err(|e| {
                ImportError::Resource(format!(
                    "failed to remove staging directory {}: {}",
                    self.path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }
}
