//! Diff a remote manifest against a local index.

use crate::types::{Deletions, FileEntry, LocalIndex, Manifest};
use std::collections::BTreeSet;

/// What a client has to do to match the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    /// Local files whose content still matches a server tombstone, with
    /// the tombstone digest they matched.
    pub to_delete: Deletions,
    /// Entries missing locally or with a different digest, in manifest order.
    pub to_download: Vec<FileEntry>,
    /// Entries already present with the right digest.
    pub up_to_date: BTreeSet<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_download.is_empty()
    }

    /// Names that are scheduled both for deletion and for download.
    ///
    /// Only happens when the server tombstones a file it still lists. The
    /// client deletes first and downloads afterwards, so the listed content
    /// ends up on disk.
    pub fn conflicts(&self) -> Vec<&str> {
        self.to_download
            .iter()
            .filter(|e| self.to_delete.contains_key(&e.name))
            .map(|e| e.name.as_str())
            .collect()
    }
}

/// Computes the delete, download and up-to-date sets.
///
/// A tombstone only deletes a local file whose digest is exactly the one
/// recorded on the tombstone; modified or replaced copies are left alone.
pub fn reconcile(remote: &Manifest, local: &LocalIndex) -> SyncPlan {
    let mut plan = SyncPlan::default();

    for (name, tombstone) in &remote.deletions {
        if local.get(name) == Some(tombstone) {
            plan.to_delete.insert(name.clone(), tombstone.clone());
        }
    }

    for entry in &remote.entries {
        match local.get(&entry.name) {
            Some(digest) if *digest == entry.digest => {
                plan.up_to_date.insert(entry.name.clone());
            }
            _ => plan.to_download.push(entry.clone()),
        }
    }

    plan
}
