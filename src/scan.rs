//! Directory scanning: hash every regular file under a root.

use crate::error::{Result, SyncError};
use crate::hash::digest_file;
use crate::types::{FileEntry, LocalIndex};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A scanned file and where it was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    pub entry: FileEntry,
    pub path: PathBuf,
}

/// Walks `root` and hashes every regular file.
///
/// Files are keyed by base name. When the same name shows up at two depths
/// the later one (in sorted walk order) replaces the earlier one in place
/// and a warning names both paths.
///
/// Any unreadable entry aborts the scan: a partial listing is worse than none.
pub fn scan_files(root: &Path) -> Result<Vec<ScannedFile>> {
    let mut files: Vec<ScannedFile> = Vec::new();
    let mut seen: HashMap<String, usize> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            debug!("Skipping non-regular file {}", entry.path().display());
            continue;
        }

        let name = entry
            .file_name()
            .to_str()
            .ok_or_else(|| SyncError::InvalidFileName(entry.path().to_path_buf()))?
            .to_string();
        let scanned = ScannedFile {
            entry: FileEntry {
                digest: digest_file(entry.path())?,
                name,
            },
            path: entry.into_path(),
        };

        match seen.get(&scanned.entry.name) {
            Some(&index) => {
                warn!(
                    "Duplicate file name {}: {} replaces {}",
                    scanned.entry.name,
                    scanned.path.display(),
                    files[index].path.display()
                );
                files[index] = scanned;
            }
            None => {
                seen.insert(scanned.entry.name.clone(), files.len());
                files.push(scanned);
            }
        }
    }

    Ok(files)
}

/// Scans `root` into manifest entries, in walk order.
pub fn scan_entries(root: &Path) -> Result<Vec<FileEntry>> {
    Ok(scan_files(root)?.into_iter().map(|f| f.entry).collect())
}

/// Scans `root` into a name -> digest index.
pub fn scan_index(root: &Path) -> Result<LocalIndex> {
    Ok(scan_files(root)?
        .into_iter()
        .map(|f| (f.entry.name, f.entry.digest))
        .collect())
}

/// Runs [`scan_files`] on the blocking pool.
pub async fn scan_files_blocking(root: &Path) -> Result<Vec<ScannedFile>> {
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || scan_files(&root))
        .await
        .map_err(|e| SyncError::TaskFailed(format!("Task join error: {}", e)))?
}
