//! ModSync - keep a local mods folder identical to a server's
//!
//! A server publishes a manifest of its folder (file name + SHA-256) together
//! with a list of tombstones for files it removed. A client hashes its own
//! folder, works out what changed, and fixes it up.
//!
//! # Features
//!
//! - **Content-addressed diff**: files are compared by SHA-256, never by mtime
//! - **Safe deletions**: a tombstone only removes a local file whose digest
//!   still matches the one recorded when the server deleted it
//! - **Bounded parallel downloads**: a fixed-size worker pool, one failure
//!   never aborts the rest of the batch
//! - **Verified writes**: downloads are hashed while streaming and only
//!   renamed into place when the digest matches
//!
//! # Example
//!
//! ```no_run
//! use modsync::{synchronize, AutoConfirm, ClientConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     server_address: "http://mc.example.com:25555".to_string(),
//!     ..ClientConfig::default()
//! };
//!
//! let summary = synchronize(&config, &AutoConfirm, CancellationToken::new()).await?;
//! assert!(summary.is_clean());
//! # Ok(())
//! # }
//! ```

mod client;
mod download;
mod error;
mod hash;
mod pool;
mod reconcile;
mod scan;
mod server;
mod types;

pub use client::{
    apply_plan, download_all, fetch_manifest, synchronize, AutoConfirm, Confirm, Phase,
    SyncSummary,
};
pub use download::download_entry;
pub use error::{Result, SyncError};
pub use hash::{digest, digest_file, digest_reader, StreamingDigest};
pub use pool::{PoolReport, TaskFailure, WorkerPool};
pub use reconcile::{reconcile, SyncPlan};
pub use scan::{scan_entries, scan_files, scan_files_blocking, scan_index, ScannedFile};
pub use server::{load_tombstones, router, serve, ManifestSource};
pub use types::{
    validate_name, ClientConfig, Deletions, FileEntry, LocalIndex, Manifest, ServerConfig, DEFAULT_CONCURRENCY,
    DEFAULT_DELETE_FILE, DEFAULT_DOWNLOAD_ENDPOINT, DEFAULT_LIST_ENDPOINT, DEFAULT_MODS_FOLDER,
    DEFAULT_SERVER_PORT,
};
