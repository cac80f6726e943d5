//! Data structures shared by the server and the client.

use crate::error::SyncError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Default folder holding the synchronized files.
pub const DEFAULT_MODS_FOLDER: &str = "mods";
/// Default location of the server's tombstone store.
pub const DEFAULT_DELETE_FILE: &str = "delete.json";
/// Default port the server listens on.
pub const DEFAULT_SERVER_PORT: u16 = 25555;
/// Default path of the manifest endpoint.
pub const DEFAULT_LIST_ENDPOINT: &str = "/list";
/// Default path of the download endpoint.
pub const DEFAULT_DOWNLOAD_ENDPOINT: &str = "/download";
/// Default number of parallel downloads.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// A single file advertised by the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Bare file name, unique within a manifest.
    pub name: String,
    /// Lowercase hex SHA-256 of the file content.
    #[serde(rename = "hash")]
    pub digest: String,
}

impl FileEntry {
    pub fn new(name: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            digest: digest.into(),
        }
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Rejects anything that is not a plain file name.
///
/// Applied to every name that crosses the wire in either direction before it
/// is joined onto a local directory.
pub fn validate_name(name: &str) -> crate::error::Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0'])
        || Path::new(name).file_name().and_then(|n| n.to_str()) != Some(name);

    if bad {
        Err(SyncError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

/// Tombstones: file name mapped to the digest it had when it was removed.
pub type Deletions = BTreeMap<String, String>;

/// Local view of a directory: file name mapped to content digest.
pub type LocalIndex = BTreeMap<String, String>;

/// The authoritative listing served by the list endpoint.
///
/// Entry order follows the server's directory walk and carries no meaning;
/// everything that compares manifests keys on the file name.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    /// Every regular file currently present on the server.
    #[serde(rename = "mods", default, deserialize_with = "null_as_default")]
    pub entries: Vec<FileEntry>,
    /// Files intentionally removed server-side.
    #[serde(rename = "delete", default, deserialize_with = "null_as_default")]
    pub deletions: Deletions,
}

impl Manifest {
    /// Looks up an entry by file name.
    pub fn entry(&self, name: &str) -> Option<&FileEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

/// Configuration for the manifest server.
///
/// # Example
///
/// ```
/// use modsync::ServerConfig;
///
/// let config = ServerConfig {
///     mods_folder: "server/mods".into(),
///     ..ServerConfig::default()
/// };
/// assert_eq!(config.list_endpoint, "/list");
/// ```
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Directory whose files are published.
    pub mods_folder: PathBuf,
    /// JSON tombstone store (name -> digest). A missing file means no tombstones.
    pub delete_file: PathBuf,
    /// Address the HTTP server binds to.
    pub listen_addr: SocketAddr,
    /// Path of the manifest endpoint.
    pub list_endpoint: String,
    /// Path of the download endpoint.
    pub download_endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            mods_folder: PathBuf::from(DEFAULT_MODS_FOLDER),
            delete_file: PathBuf::from(DEFAULT_DELETE_FILE),
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_SERVER_PORT)),
            list_endpoint: DEFAULT_LIST_ENDPOINT.to_string(),
            download_endpoint: DEFAULT_DOWNLOAD_ENDPOINT.to_string(),
        }
    }
}

/// Configuration for the synchronizing client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the server (e.g., `http://localhost:25555`)
    pub server_address: String,
    /// Path of the manifest endpoint.
    pub list_endpoint: String,
    /// Path of the download endpoint.
    pub download_endpoint: String,
    /// Local directory kept in sync.
    pub mods_folder: PathBuf,
    /// Maximum number of concurrent downloads (default: 10).
    ///
    /// Bounds both outbound connections and open file handles, whatever the
    /// size of the download set.
    pub max_concurrent_downloads: usize,
}

impl ClientConfig {
    pub fn list_url(&self) -> String {
        join_url(&self.server_address, &self.list_endpoint)
    }

    pub fn download_url(&self) -> String {
        join_url(&self.server_address, &self.download_endpoint)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: format!("http://localhost:{}", DEFAULT_SERVER_PORT),
            list_endpoint: DEFAULT_LIST_ENDPOINT.to_string(),
            download_endpoint: DEFAULT_DOWNLOAD_ENDPOINT.to_string(),
            mods_folder: PathBuf::from(DEFAULT_MODS_FOLDER),
            max_concurrent_downloads: DEFAULT_CONCURRENCY,
        }
    }
}

// Older servers emit `null` for an empty list or map.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
