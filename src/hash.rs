//! SHA-256 content digests.

use crate::error::{Result, SyncError};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Hex-encoded SHA-256 of `bytes`, always lowercase.
pub fn digest(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Digests everything `reader` yields.
///
/// Reads in 1MB blocks so large files never have to fit in memory.
pub fn digest_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = StreamingDigest::new();
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hasher.finish())
}

/// Digests the file at `path`.
pub fn digest_file(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::with_capacity(READ_BUFFER_SIZE, file);
    digest_reader(reader).map_err(SyncError::IoError)
}

/// Incremental digest, fed as bytes arrive off the network.
#[derive(Default)]
pub struct StreamingDigest(Sha256);

impl StreamingDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.0.update(chunk);
    }

    pub fn finish(self) -> String {
        format!("{:x}", self.0.finalize())
    }
}
