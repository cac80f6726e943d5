//! Single-file download functionality.

use crate::error::{Result, SyncError};
use crate::hash::StreamingDigest;
use crate::types::{validate_name, FileEntry};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Downloads one manifest entry into `dest_dir`.
///
/// The body is streamed to a hidden `.part` file next to the destination and
/// hashed on the way in. Only when the length and the digest both check out is
/// it renamed over the destination, so a failed download never leaves a
/// truncated file under the real name. Entries whose name is not a bare file
/// name are refused before any request is made.
///
/// # Arguments
///
/// * `client` - Shared HTTP client
/// * `download_url` - Full URL of the download endpoint (without query)
/// * `dest_dir` - Local directory the file is written to
/// * `entry` - The entry to fetch
///
/// # Returns
///
/// `Ok(())` once the file is in place, or an error naming what went wrong.
pub async fn download_entry(
    client: &reqwest::Client,
    download_url: &str,
    dest_dir: &Path,
    entry: &FileEntry,
) -> Result<()> {
    validate_name(&entry.name)?;
    let destination = dest_dir.join(&entry.name);
    let partial = partial_path(dest_dir, &entry.name);

    let result = match fetch_to(client, download_url, &partial, entry).await {
        Ok(()) => tokio::fs::rename(&partial, &destination)
            .await
            .map_err(SyncError::from),
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => {
            info!("Downloaded {}", entry.name);
            Ok(())
        }
        Err(e) => {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                if cleanup.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove {}: {}", partial.display(), cleanup);
                }
            }
            Err(e)
        }
    }
}

async fn fetch_to(
    client: &reqwest::Client,
    download_url: &str,
    partial: &Path,
    entry: &FileEntry,
) -> Result<()> {
    let response = client
        .get(download_url)
        .query(&[("file", entry.name.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(SyncError::Network(format!(
            "Failed to download {}: HTTP {}",
            entry.name, status
        )));
    }
    let content_length = response.content_length();

    let mut file = BufWriter::new(tokio::fs::File::create(partial).await?);
    let mut hasher = StreamingDigest::new();
    let mut written = 0u64;

    let mut byte_stream = response.bytes_stream();
    while let Some(piece) = byte_stream.next().await {
        let chunk = piece?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if let Some(expected) = content_length {
        if written != expected {
            return Err(SyncError::Network(format!(
                "Size mismatch for {}: expected {} bytes, got {} bytes",
                entry.name, expected, written
            )));
        }
    } else {
        debug!("No Content-Length for {}, skipping size check", entry.name);
    }

    let actual = hasher.finish();
    if actual != entry.digest {
        return Err(SyncError::Integrity {
            name: entry.name.clone(),
            expected: entry.digest.clone(),
            actual,
        });
    }

    Ok(())
}

fn partial_path(dest_dir: &Path, name: &str) -> PathBuf {
    dest_dir.join(format!(".{}.part", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_is_hidden_sibling() {
        let path = partial_path(Path::new("/mods"), "a.jar");
        assert_eq!(path, PathBuf::from("/mods/.a.jar.part"));
    }

    #[tokio::test]
    async fn unreachable_server_is_an_error_and_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let client = reqwest::Client::new();
        let entry = FileEntry::new("a.jar", "00");

        // Port 9 (discard) on localhost is not expected to accept HTTP.
        let err = download_entry(&client, "http://127.0.0.1:9/download", dir.path(), &entry)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ReqwestError(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn path_like_names_are_refused_before_any_request() {
        let root = tempfile::tempdir().unwrap();
        let dest = root.path().join("mods");
        std::fs::create_dir(&dest).unwrap();
        let client = reqwest::Client::new();

        let escape = format!("/../{}/escaped.jar", root.path().display());
        for name in [escape.as_str(), "../escaped.jar", "sub/a.jar", ".."] {
            let entry = FileEntry::new(name, "00");
            let err = download_entry(&client, "http://127.0.0.1:9/download", &dest, &entry)
                .await
                .unwrap_err();
            assert!(matches!(err, SyncError::InvalidName(_)), "{:?}", name);
        }

        assert_eq!(std::fs::read_dir(&dest).unwrap().count(), 0);
        assert!(!root.path().join("escaped.jar").exists());
    }
}
