//! Manifest source: publishes a directory over HTTP.
//!
//! The manifest is computed once when the server starts and never changes
//! afterwards. Handlers share it read-only through an `Arc`.

use crate::error::{Result, SyncError};
use crate::scan::scan_files;
use crate::types::{validate_name, Deletions, Manifest, ServerConfig};
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};

/// Immutable snapshot of the published directory.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    manifest: Manifest,
    locations: HashMap<String, PathBuf>,
}

impl ManifestSource {
    /// Scans `mods_folder` and loads the tombstone store at `delete_file`.
    ///
    /// Fails if the folder cannot be fully scanned or the tombstone store
    /// exists but cannot be parsed. A missing tombstone store is fine.
    pub fn build(mods_folder: &Path, delete_file: &Path) -> Result<Self> {
        if !mods_folder.is_dir() {
            return Err(SyncError::NotFound(mods_folder.display().to_string()));
        }

        let files = scan_files(mods_folder)?;
        let deletions = load_tombstones(delete_file)?;

        let mut locations = HashMap::with_capacity(files.len());
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            locations.insert(file.entry.name.clone(), file.path);
            entries.push(file.entry);
        }

        for entry in &entries {
            if deletions.contains_key(&entry.name) {
                warn!(
                    "{} is both listed and tombstoned; clients will delete and re-download it",
                    entry.name
                );
            }
        }

        info!(
            "Manifest built: {} files, {} tombstones",
            entries.len(),
            deletions.len()
        );

        Ok(Self {
            manifest: Manifest { entries, deletions },
            locations,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Opens a published file by bare name.
    ///
    /// Only names present in the manifest are served. Anything that looks
    /// like a path is rejected before it gets near the filesystem.
    pub async fn open_file(&self, name: &str) -> Result<(tokio::fs::File, u64)> {
        validate_name(name)?;

        let path = self
            .locations
            .get(name)
            .ok_or_else(|| SyncError::NotFound(name.to_string()))?;

        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(SyncError::NotFound(name.to_string()));
        }

        Ok((file, metadata.len()))
    }
}

/// Reads the JSON tombstone store (name -> digest).
///
/// A missing or blank file means there are no tombstones.
pub fn load_tombstones(path: &Path) -> Result<Deletions> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No tombstone store at {}, assuming none", path.display());
            return Ok(Deletions::new());
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Ok(Deletions::new());
    }

    let deletions: Option<Deletions> = serde_json::from_str(&content)?;
    Ok(deletions.unwrap_or_default())
}

/// Builds the HTTP routes for a manifest source.
pub fn router(source: Arc<ManifestSource>, list_endpoint: &str, download_endpoint: &str) -> Router {
    Router::new()
        .route(&route_path(list_endpoint), get(list_handler))
        .route(&route_path(download_endpoint), get(download_handler))
        .with_state(source)
}

fn route_path(endpoint: &str) -> String {
    format!("/{}", endpoint.trim_start_matches('/'))
}

async fn list_handler(State(source): State<Arc<ManifestSource>>) -> Json<Manifest> {
    info!("Served manifest");
    Json(source.manifest().clone())
}

async fn download_handler(
    State(source): State<Arc<ManifestSource>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(name) = params.get("file").filter(|n| !n.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing file parameter").into_response();
    };

    let (file, len) = match source.open_file(name).await {
        Ok(opened) => opened,
        Err(SyncError::NotFound(_)) | Err(SyncError::InvalidName(_)) => {
            warn!("Refused download of {:?}", name);
            return (StatusCode::NOT_FOUND, "file not found").into_response();
        }
        Err(e) => {
            error!("Failed to open {}: {}", name, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "cannot read file").into_response();
        }
    };

    info!("Serving {} ({} bytes)", name, len);
    (
        [
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", name),
            ),
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Builds the manifest and serves it until Ctrl-C.
pub async fn serve(config: &ServerConfig) -> Result<()> {
    let mods_folder = config.mods_folder.clone();
    let delete_file = config.delete_file.clone();
    let source = tokio::task::spawn_blocking(move || ManifestSource::build(&mods_folder, &delete_file))
        .await
        .map_err(|e| SyncError::TaskFailed(format!("Task join error: {}", e)))??;

    let app = router(
        Arc::new(source),
        &config.list_endpoint,
        &config.download_endpoint,
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutting down");
        })
        .await?;

    Ok(())
}
