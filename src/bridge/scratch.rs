// src/bridge/scratch.rs

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use tracing::{debug, warn};

use super::job::ScriptJob;

/// The directory scratch script files live in.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

/// Outcome of one sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Stale files deleted by this pass.
    pub removed: usize,
    /// Files young enough to be left alone.
    pub kept: usize,
    /// Stale files that could not be deleted.
    pub failed: usize,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persists `job.body` to a new, uniquely named file.
    ///
    /// The directory is created if missing. The file is opened with
    /// `create_new`, so an existing file is never overwritten. If writing the
    /// body fails the partial file is removed before returning.
    pub fn write(&self, job: &ScriptJob, extension: &str) -> io::Result<ScratchFile> {
        fs::create_dir_all(&self.path)?;

        let path = self.path.join(job.file_name(extension));
        let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let scratch = ScratchFile::new(path);

        file.write_all(job.body.as_bytes())?;
        file.flush()?;

        Ok(scratch)
    }

    /// Deletes every file whose last modification is older than `stale_after`.
    ///
    /// Never fails: a missing directory is an empty sweep, files that vanish
    /// mid-sweep (another job cleaning up) are skipped, and deletion errors are
    /// counted and logged per file.
    pub fn sweep(&self, stale_after: Duration) -> SweepReport {
        let mut report = SweepReport::default();

        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(
                    "Failed to list scratch directory {}: {}",
                    self.path.display(),
                    e
                );
                return report;
            }
        };

        let now = SystemTime::now();

        for entry in entries.flatten() {
            let metadata = match entry.metadata() {
                Ok(metadata) if metadata.is_file() => metadata,
                _ => continue,
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };

            let age = now.duration_since(modified).unwrap_or_default();
            if age <= stale_after {
                report.kept += 1;
                continue;
            }

            let path = entry.path();
            match fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Swept stale scratch file {}", path.display());
                    report.removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    debug!("Failed to sweep {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// A scratch file owned by exactly one job.
///
/// Removed explicitly with [`ScratchFile::remove`] so the caller can observe
/// failures; if it is dropped without that (early return, panic) removal is
/// attempted silently.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    released: bool,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Deletes the file. A file that is already gone counts as deleted.
    pub fn remove(mut self) -> io::Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Gives up ownership without deleting; the sweep evicts the file once it
    /// goes stale.
    pub fn leave_for_sweep(mut self) -> PathBuf {
        self.released = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.released {
            let _ = fs::remove_file(&self.path);
        }
    }
}
