//! MessagePack snapshot cache for the last successfully loaded network.
//!
//! The snapshot is stored with a SHA-256 checksum of its encoded payload; a
//! file that fails to decode or verify is treated as absent.

use std::path::Path;

use saferoute_network_models::NetworkSnapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::NetworkError;

/// Bumped whenever the snapshot layout changes.
const CACHE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    checksum: String,
    payload: Vec<u8>,
}

fn checksum(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

fn cache_error(path: &Path, reason: impl ToString) -> NetworkError {
    NetworkError::Cache {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Writes `snapshot` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`NetworkError::Cache`] if encoding or writing fails.
pub async fn write_snapshot(path: &Path, snapshot: &NetworkSnapshot) -> Result<(), NetworkError> {
    let payload = rmp_serde::to_vec(snapshot).map_err(|e| cache_error(path, e))?;
    let envelope = CacheEnvelope {
        version: CACHE_VERSION,
        checksum: checksum(&payload),
        payload,
    };
    let bytes = rmp_serde::to_vec(&envelope).map_err(|e| cache_error(path, e))?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| cache_error(path, e))?;
    }
    tokio::fs::write(path, &bytes)
        .await
        .map_err(|e| cache_error(path, e))?;

    log::info!(
        "Cached network snapshot ({} nodes, {} edges) to {}",
        snapshot.nodes.len(),
        snapshot.edges.len(),
        path.display()
    );
    Ok(())
}

/// Reads and verifies a snapshot written by [`write_snapshot`].
///
/// # Errors
///
/// Returns [`NetworkError::Cache`] if the file is missing, undecodable,
/// from another cache version, or fails its checksum.
pub async fn read_snapshot(path: &Path) -> Result<NetworkSnapshot, NetworkError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| cache_error(path, e))?;
    let envelope: CacheEnvelope =
        rmp_serde::from_slice(&bytes).map_err(|e| cache_error(path, e))?;

    if envelope.version != CACHE_VERSION {
        return Err(cache_error(
            path,
            format!("cache version {} (expected {CACHE_VERSION})", envelope.version),
        ));
    }
    if checksum(&envelope.payload) != envelope.checksum {
        return Err(cache_error(path, "checksum mismatch"));
    }

    rmp_serde::from_slice(&envelope.payload).map_err(|e| cache_error(path, e))
}
