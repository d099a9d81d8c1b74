//! Expansion of command-line paths into upload entries.
//!
//! Directories are walked recursively. Entries are named after the file
//! itself since the server matches uploaded files to metadata by name.

use std::path::{Path, PathBuf};

use crate::error::SubmitError;
use crate::queue::PendingFile;

/// Expands `paths` into pending files, in argument order. Directory
/// contents are sorted by path.
pub fn scan_paths(paths: &[PathBuf]) -> Result<Vec<PendingFile>, SubmitError> {
    let mut files = Vec::new();
    for path in paths {
        let metadata = std::fs::metadata(path)?;
        if metadata.is_dir() {
            walk_dir(path, &mut files)?;
        } else {
            files.push(PendingFile::from_path(path)?);
        }
    }
    Ok(files)
}

fn walk_dir(current: &Path, files: &mut Vec<PendingFile>) -> Result<(), SubmitError> {
    let mut entries = std::fs::read_dir(current)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;

        if metadata.is_dir() {
            walk_dir(&path, files)?;
        } else if metadata.is_file() {
            files.push(PendingFile::new(
                &path,
                entry.file_name().to_string_lossy().into_owned(),
                metadata.len(),
            ));
        }
    }

    Ok(())
}
