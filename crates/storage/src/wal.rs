// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Write-ahead log: newline-delimited JSON entries, one batch per line.
//!
//! A batch is appended and flushed before its events are applied to the
//! materialized state, so a torn write can lose at most the final,
//! not-yet-acknowledged batch. Partial trailing lines are tolerated on
//! replay for the same reason.

use crate::event::StoreEvent;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("wal entry {seq} is corrupt: {reason}")]
    Corrupt { seq: u64, reason: String },
}

/// One durable batch: the store's transaction unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub events: Vec<StoreEvent>,
}

/// Append-only write-ahead log.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    next_seq: u64,
}

impl Wal {
    /// Open (creating if absent) the WAL at `path` and scan it to find the
    /// next sequence number. Returns the WAL and the entries already on disk
    /// with `seq > after_seq` for replay.
    pub fn open(path: &Path, after_seq: u64) -> Result<(Self, Vec<WalEntry>), WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| WalError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let (entries, valid_len) = Self::read_entries(path)?;
        let next_seq = entries.last().map(|e| e.seq + 1).unwrap_or(1);
        let replay = entries.into_iter().filter(|e| e.seq > after_seq).collect();

        // Cut off a torn trailing line so new appends start on a clean line.
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.len() > valid_len {
                let file = OpenOptions::new().write(true).open(path).map_err(|source| {
                    WalError::Io { path: path.to_path_buf(), source }
                })?;
                file.set_len(valid_len)
                    .map_err(|source| WalError::Io { path: path.to_path_buf(), source })?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path).map_err(
            |source| WalError::Io { path: path.to_path_buf(), source },
        )?;

        Ok((Self { path: path.to_path_buf(), writer: BufWriter::new(file), next_seq }, replay))
    }

    /// Read all decodable entries and the byte length of the valid prefix.
    fn read_entries(path: &Path) -> Result<(Vec<WalEntry>, u64), WalError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(source) => return Err(WalError::Io { path: path.to_path_buf(), source }),
        };

        let mut entries = Vec::new();
        let mut valid_len: u64 = 0;
        let reader = BufReader::new(file);
        for line in reader.lines() {
            let line = line.map_err(|source| WalError::Io { path: path.to_path_buf(), source })?;
            if line.trim().is_empty() {
                valid_len += line.len() as u64 + 1;
                continue;
            }
            match serde_json::from_str::<WalEntry>(&line) {
                Ok(entry) => {
                    entries.push(entry);
                    valid_len += line.len() as u64 + 1;
                }
                Err(e) => {
                    // A torn final line is expected after a crash; anything
                    // else means real corruption.
                    tracing::warn!(error = %e, "discarding undecodable trailing wal line");
                    break;
                }
            }
        }
        Ok((entries, valid_len))
    }

    /// Append one batch and flush it to the OS. Returns the assigned seq.
    pub fn append(&mut self, events: &[StoreEvent]) -> Result<u64, WalError> {
        let seq = self.next_seq;
        let entry = WalEntry { seq, events: events.to_vec() };
        let line = serde_json::to_string(&entry)
            .map_err(|e| WalError::Corrupt { seq, reason: e.to_string() })?;
        self.writer
            .write_all(line.as_bytes())
            .and_then(|_| self.writer.write_all(b"\n"))
            .and_then(|_| self.writer.flush())
            .map_err(|source| WalError::Io { path: self.path.clone(), source })?;
        self.next_seq += 1;
        Ok(seq)
    }

    /// Highest sequence number handed out so far.
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    /// Truncate the log after a successful snapshot checkpoint.
    pub fn truncate(&mut self) -> Result<(), WalError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| WalError::Io { path: self.path.clone(), source })?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
