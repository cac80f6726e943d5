//! Error types for sync operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building, serving or applying a manifest.
#[derive(Error, Debug)]
pub enum SyncError {
    /// I/O error during file operations.
    #[error(transparent)]
    IoError(#[from] io::Error),

    /// Error raised while walking a directory tree.
    #[error(transparent)]
    WalkError(#[from] walkdir::Error),

    /// HTTP request error during manifest fetch or download.
    #[error(transparent)]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),

    /// The remote answered, but not with something usable.
    #[error("Network error: {0}")]
    Network(String),

    /// The requested file is not served.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The requested name is not a bare file name.
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    /// A file on disk has a name that cannot be represented in a manifest.
    #[error("File name is not valid UTF-8: {0:?}")]
    InvalidFileName(PathBuf),

    /// Downloaded content does not hash to the advertised digest.
    #[error("Digest mismatch for {name}: expected {expected}, got {actual}")]
    Integrity {
        name: String,
        expected: String,
        actual: String,
    },

    /// A background task died before producing a result.
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SyncError>;
