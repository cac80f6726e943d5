//! Client side: fetch the manifest, diff, delete, download.

use crate::download::download_entry;
use crate::error::{Result, SyncError};
use crate::pool::{PoolReport, WorkerPool};
use crate::reconcile::{reconcile, SyncPlan};
use crate::hash::digest_file;
use crate::scan::scan_files_blocking;
use crate::types::{validate_name, ClientConfig, FileEntry, LocalIndex, Manifest};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// The two mutating phases of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Delete,
    Download,
}

/// Decides whether a phase goes ahead.
///
/// The binary asks on the terminal; tests and unattended runs use
/// [`AutoConfirm`].
pub trait Confirm: Send + Sync {
    fn confirm(&self, phase: Phase, names: &[String]) -> bool;
}

/// Approves every phase without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

impl Confirm for AutoConfirm {
    fn confirm(&self, _phase: Phase, _names: &[String]) -> bool {
        true
    }
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub deleted: usize,
    pub delete_failed: usize,
    pub downloaded: usize,
    /// Names of entries whose download failed.
    pub download_failed: Vec<String>,
    pub unchanged: usize,
    /// Deletions or downloads declined at the prompt, cancelled, or
    /// deletions of files that changed after the scan.
    pub skipped: usize,
}

impl SyncSummary {
    pub fn is_clean(&self) -> bool {
        self.delete_failed == 0 && self.download_failed.is_empty()
    }
}

/// Fetches and parses the server manifest.
pub async fn fetch_manifest(client: &reqwest::Client, list_url: &str) -> Result<Manifest> {
    info!("Retrieving manifest from {}", list_url);

    let response = client.get(list_url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Network(format!(
            "Failed to fetch manifest from {}: HTTP {}",
            list_url, status
        )));
    }

    let manifest = response.json::<Manifest>().await.map_err(|e| {
        SyncError::Network(format!(
            "Invalid manifest format from {}: {}\n\
             Expected JSON with fields: mods, delete",
            list_url, e
        ))
    })?;

    info!(
        "Manifest lists {} files and {} tombstones",
        manifest.entries.len(),
        manifest.deletions.len()
    );
    Ok(manifest)
}

/// Brings `config.mods_folder` in line with the server.
///
/// This is the main entry point for the client. It performs the following steps:
///
/// 1. Fetches the manifest from the server
/// 2. Hashes every local file
/// 3. Reconciles the two into a [`SyncPlan`]
/// 4. Deletes tombstoned files, then downloads missing or stale ones
///
/// Steps 1 and 2 are all-or-nothing. Failures in step 4 are per file and
/// end up in the returned summary.
///
/// # Example
///
/// ```no_run
/// use modsync::{synchronize, AutoConfirm, ClientConfig};
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ClientConfig::default();
/// let summary = synchronize(&config, &AutoConfirm, CancellationToken::new()).await?;
/// println!("{} downloaded", summary.downloaded);
/// # Ok(())
/// # }
/// ```
pub async fn synchronize(
    config: &ClientConfig,
    confirm: &dyn Confirm,
    cancel: CancellationToken,
) -> Result<SyncSummary> {
    let client = reqwest::Client::new();

    let manifest = fetch_manifest(&client, &config.list_url()).await?;
    let files = scan_files_blocking(&config.mods_folder).await?;
    info!(
        "Scanned {} local files in {}",
        files.len(),
        config.mods_folder.display()
    );

    let mut local = LocalIndex::new();
    let mut locations = HashMap::with_capacity(files.len());
    for file in files {
        local.insert(file.entry.name.clone(), file.entry.digest);
        locations.insert(file.entry.name, file.path);
    }

    let plan = reconcile(&manifest, &local);
    let summary = apply_plan(&client, config, plan, &locations, confirm, cancel).await;

    log_summary(&summary);
    Ok(summary)
}

/// Executes a plan: the whole delete phase, then the download phase.
///
/// `locations` maps each scanned name to the path it was hashed from; a
/// deletion removes that exact file. Names without a location fall back to
/// `config.mods_folder`. Either way the file is hashed again right before
/// removal and kept unless it still matches its tombstone.
pub async fn apply_plan(
    client: &reqwest::Client,
    config: &ClientConfig,
    plan: SyncPlan,
    locations: &HashMap<String, PathBuf>,
    confirm: &dyn Confirm,
    cancel: CancellationToken,
) -> SyncSummary {
    let mut summary = SyncSummary {
        unchanged: plan.up_to_date.len(),
        ..SyncSummary::default()
    };

    for name in plan.conflicts() {
        warn!(
            "Server both lists and tombstones {}; it will be deleted and downloaded again",
            name
        );
    }

    if plan.is_empty() {
        info!("All files are up to date");
        return summary;
    }

    if !plan.to_delete.is_empty() {
        let names: Vec<String> = plan.to_delete.keys().cloned().collect();
        if confirm.confirm(Phase::Delete, &names) {
            for (name, tombstone) in &plan.to_delete {
                if let Err(e) = validate_name(name) {
                    error!("Refusing to delete {:?}: {}", name, e);
                    summary.delete_failed += 1;
                    continue;
                }
                let path = locations
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| config.mods_folder.join(name));

                match remove_if_unchanged(&path, tombstone).await {
                    Ok(true) => {
                        info!("Deleted {}", path.display());
                        summary.deleted += 1;
                    }
                    Ok(false) => {
                        warn!("{} no longer matches its tombstone, keeping it", path.display());
                        summary.skipped += 1;
                    }
                    Err(e) => {
                        error!("Failed to delete {}: {}", path.display(), e);
                        summary.delete_failed += 1;
                    }
                }
            }
        } else {
            info!("Skipping {} deletions", names.len());
            summary.skipped += names.len();
        }
    }

    if !plan.to_download.is_empty() {
        let names: Vec<String> = plan.to_download.iter().map(|e| e.name.clone()).collect();
        if confirm.confirm(Phase::Download, &names) {
            let report = download_all(client, config, plan.to_download, cancel).await;
            summary.downloaded = report.succeeded.len();
            summary.download_failed = report.failed.into_iter().map(|f| f.task.name).collect();
            summary.skipped += report.skipped.len();
        } else {
            info!("Skipping {} downloads", names.len());
            summary.skipped += names.len();
        }
    }

    summary
}

/// Removes `path` only if its content still hashes to `tombstone`.
async fn remove_if_unchanged(path: &Path, tombstone: &str) -> Result<bool> {
    let target = path.to_path_buf();
    let current = tokio::task::spawn_blocking(move || digest_file(&target))
        .await
        .map_err(|e| SyncError::TaskFailed(format!("Task join error: {}", e)))??;

    if current != tombstone {
        return Ok(false);
    }
    tokio::fs::remove_file(path).await?;
    Ok(true)
}

/// Downloads `entries` on a pool of `config.max_concurrent_downloads` workers.
pub async fn download_all(
    client: &reqwest::Client,
    config: &ClientConfig,
    entries: Vec<FileEntry>,
    cancel: CancellationToken,
) -> PoolReport<FileEntry> {
    let pb = indicatif::ProgressBar::new(entries.len() as u64);
    if let Ok(style) = indicatif::ProgressStyle::default_bar()
        .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg} | {elapsed_precise} elapsed")
    {
        pb.set_style(style.progress_chars("█▓▒░ "));
    }
    pb.set_message(format!("Downloading {} files", entries.len()));

    let client = client.clone();
    let download_url = config.download_url();
    let dest_dir = config.mods_folder.clone();
    let progress = pb.clone();

    let report = WorkerPool::new(config.max_concurrent_downloads)
        .with_cancellation(cancel)
        .run(entries, move |entry: FileEntry| {
            let client = client.clone();
            let download_url = download_url.clone();
            let dest_dir = dest_dir.clone();
            let progress = progress.clone();

            async move {
                progress.set_message(entry.name.clone());
                let result = download_entry(&client, &download_url, &dest_dir, &entry).await;
                progress.inc(1);
                result
            }
        })
        .await;

    if report.failed.is_empty() {
        pb.finish_with_message("Download complete");
    } else {
        pb.finish_with_message(format!("{} downloads failed", report.failed.len()));
    }
    report
}

fn log_summary(summary: &SyncSummary) {
    info!(
        "Deleted: {}, delete failures: {}, downloaded: {}, download failures: {}, unchanged: {}, skipped: {}",
        summary.deleted,
        summary.delete_failed,
        summary.downloaded,
        summary.download_failed.len(),
        summary.unchanged,
        summary.skipped
    );
    for name in &summary.download_failed {
        warn!("Not updated: {}", name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::digest;
    use crate::types::Deletions;
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    struct Declines(Mutex<Vec<Phase>>);

    impl Confirm for Declines {
        fn confirm(&self, phase: Phase, _names: &[String]) -> bool {
            self.0.lock().unwrap().push(phase);
            false
        }
    }

    #[tokio::test]
    async fn empty_plan_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            mods_folder: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            up_to_date: BTreeSet::from(["a.jar".to_string()]),
            ..SyncPlan::default()
        };

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &HashMap::new(),
            &AutoConfirm,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.unchanged, 1);
        assert!(summary.is_clean());
    }

    #[tokio::test]
    async fn declined_phases_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.jar"), b"old").unwrap();
        let config = ClientConfig {
            mods_folder: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            to_delete: Deletions::from([("old.jar".to_string(), digest(b"old"))]),
            to_download: vec![FileEntry::new("new.jar", "ff")],
            ..SyncPlan::default()
        };
        let confirm = Declines(Mutex::new(Vec::new()));

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &HashMap::new(),
            &confirm,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.deleted, 0);
        assert!(dir.path().join("old.jar").exists());
        assert_eq!(
            *confirm.0.lock().unwrap(),
            vec![Phase::Delete, Phase::Download]
        );
    }

    #[tokio::test]
    async fn missing_file_counts_as_delete_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            mods_folder: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            to_delete: Deletions::from([("ghost.jar".to_string(), digest(b"ghost"))]),
            ..SyncPlan::default()
        };

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &HashMap::new(),
            &AutoConfirm,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(summary.delete_failed, 1);
        assert!(!summary.is_clean());
    }

    #[tokio::test]
    async fn deletes_the_scanned_copy_not_its_namesake() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("c.jar"), b"user modified").unwrap();
        std::fs::write(dir.path().join("sub/c.jar"), b"old").unwrap();
        let config = ClientConfig {
            mods_folder: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            to_delete: Deletions::from([("c.jar".to_string(), digest(b"old"))]),
            ..SyncPlan::default()
        };
        let locations = HashMap::from([("c.jar".to_string(), dir.path().join("sub/c.jar"))]);

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &locations,
            &AutoConfirm,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.deleted, 1);
        assert!(!dir.path().join("sub/c.jar").exists());
        assert_eq!(
            std::fs::read(dir.path().join("c.jar")).unwrap(),
            b"user modified"
        );
    }

    #[tokio::test]
    async fn file_changed_since_scan_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("old.jar"), b"rewritten").unwrap();
        let config = ClientConfig {
            mods_folder: dir.path().to_path_buf(),
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            to_delete: Deletions::from([("old.jar".to_string(), digest(b"old"))]),
            ..SyncPlan::default()
        };

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &HashMap::new(),
            &AutoConfirm,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.skipped, 1);
        assert!(summary.is_clean());
        assert_eq!(std::fs::read(dir.path().join("old.jar")).unwrap(), b"rewritten");
    }

    #[tokio::test]
    async fn path_like_tombstone_is_refused() {
        let root = tempfile::tempdir().unwrap();
        let mods = root.path().join("mods");
        std::fs::create_dir(&mods).unwrap();
        std::fs::write(root.path().join("victim.jar"), b"keep").unwrap();
        let config = ClientConfig {
            mods_folder: mods,
            ..ClientConfig::default()
        };
        let plan = SyncPlan {
            to_delete: Deletions::from([("../victim.jar".to_string(), digest(b"keep"))]),
            ..SyncPlan::default()
        };

        let summary = apply_plan(
            &reqwest::Client::new(),
            &config,
            plan,
            &HashMap::new(),
            &AutoConfirm,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.delete_failed, 1);
        assert!(root.path().join("victim.jar").exists());
    }
}
