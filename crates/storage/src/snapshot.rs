// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Zstd-compressed snapshots of the materialized state.
//!
//! A snapshot records the WAL sequence it covers; startup loads the
//! snapshot and replays only the WAL entries after it.

use crate::state::StoreState;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("snapshot encode/decode error: {0}")]
    Codec(String),

    #[error("snapshot version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// WAL sequence covered by this snapshot.
    pub seq: u64,
    pub state: StoreState,
}

impl Snapshot {
    /// Write a snapshot atomically (temp file + rename).
    pub fn save(path: &Path, seq: u64, state: &StoreState) -> Result<(), SnapshotError> {
        let snapshot =
            Snapshot { version: CURRENT_SNAPSHOT_VERSION, seq, state: state.clone() };
        let json = serde_json::to_vec(&snapshot).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        let compressed = zstd::encode_all(json.as_slice(), ZSTD_LEVEL)
            .map_err(|e| SnapshotError::Codec(e.to_string()))?;

        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &compressed)
            .map_err(|source| SnapshotError::Io { path: tmp.clone(), source })?;
        std::fs::rename(&tmp, path)
            .map_err(|source| SnapshotError::Io { path: path.to_path_buf(), source })?;
        Ok(())
    }

    /// Load a snapshot if one exists. Rebuilds transient indexes.
    pub fn load(path: &Path) -> Result<Option<Snapshot>, SnapshotError> {
        let compressed = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(SnapshotError::Io { path: path.to_path_buf(), source }),
        };
        let json = zstd::decode_all(compressed.as_slice())
            .map_err(|e| SnapshotError::Codec(e.to_string()))?;
        let mut snapshot: Snapshot =
            serde_json::from_slice(&json).map_err(|e| SnapshotError::Codec(e.to_string()))?;
        if snapshot.version > CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::VersionTooNew {
                found: snapshot.version,
                supported: CURRENT_SNAPSHOT_VERSION,
            });
        }
        snapshot.state.rebuild_indexes();
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
