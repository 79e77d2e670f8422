//! Filesystem-backed record of what has already been retrieved.
//!
//! The media directory is the only durable state: a candidate is known when a
//! regular file with its derived filename already exists there. Lookups always
//! hit the disk so that files written earlier in the same run are seen.

use crate::naming::TargetFile;
use crate::{EngineError, Result};
use std::path::Path;

pub trait ArtifactIndex: Send + Sync {
    fn is_known(&self, target: &TargetFile) -> Result<bool>;
}

/// Dedup by exact filename match. Identical content saved under two names counts as two items.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilenameIndex;

impl ArtifactIndex for FilenameIndex {
    fn is_known(&self, target: &TargetFile) -> Result<bool> {
        exists(&target.directory, &target.file_name())
    }
}

pub fn exists(directory: &Path, filename: &str) -> Result<bool> {
    let entries =
        std::fs::read_dir(directory).map_err(|e| EngineError::filesystem(directory, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| EngineError::filesystem(directory, e))?;
        if entry.file_name().to_str() != Some(filename) {
            continue;
        }
        // Follows symlinks, so a link to a regular file counts.
        let is_file = std::fs::metadata(entry.path())
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if is_file {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn ensure_directory(directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory).map_err(|e| EngineError::filesystem(directory, e))
}
