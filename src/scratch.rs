//! Per-request scratch space on local disk.
//!
//! Every allocation is uniquely named and removed when its guard is dropped, so cleanup happens
//! on success, on early return and on error alike.

use crate::error::SimStageError;

use std::path::{Path, PathBuf};
use tempfile::{Builder, NamedTempFile, TempDir};

/// Prefix of all scratch allocations
const PREFIX: &str = "simstage-";

/// Allocates scratch directories and files beneath an optional base directory.
#[derive(Clone, Debug, Default)]
pub struct ScratchSpace {
    base: Option<PathBuf>,
}

impl ScratchSpace {
    /// Create scratch space in `base`, or in the system temporary directory if `None`.
    pub fn new(base: Option<PathBuf>) -> Self {
        Self { base }
    }

    /// Directory in which allocations are created.
    pub fn base(&self) -> PathBuf {
        self.base.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Allocate an empty directory, deleted recursively when the returned guard drops.
    pub fn dir(&self) -> Result<ScratchDir, SimStageError> {
        let dir = Builder::new().prefix(PREFIX).tempdir_in(self.base())?;
        tracing::debug!(path = %dir.path().display(), "allocated scratch directory");
        Ok(ScratchDir(dir))
    }

    /// Allocate an empty file with the given suffix, deleted when the returned guard drops.
    pub fn file(&self, suffix: &str) -> Result<ScratchFile, SimStageError> {
        let file = Builder::new()
            .prefix(PREFIX)
            .suffix(suffix)
            .tempfile_in(self.base())?;
        tracing::debug!(path = %file.path().display(), "allocated scratch file");
        Ok(ScratchFile(file))
    }
}

/// A scratch directory.
#[derive(Debug)]
pub struct ScratchDir(TempDir);

impl ScratchDir {
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Delete the directory now, reporting any failure.
    pub fn close(self) -> Result<(), SimStageError> {
        Ok(self.0.close()?)
    }
}

/// A scratch file.
#[derive(Debug)]
pub struct ScratchFile(NamedTempFile);

impl ScratchFile {
    pub fn path(&self) -> &Path {
        self.0.path()
    }

    /// Reopen the file for reading from the start.
    pub fn reopen(&self) -> Result<std::fs::File, SimStageError> {
        Ok(self.0.reopen()?)
    }
}
