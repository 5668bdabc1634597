// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Local adapters behind the collaborator seams.
//!
//! These back the standalone daemon: a directory-based partitioned log, a
//! schema file registry, a filesystem blob store with signed URLs, and a
//! warehouse stub that records statements. Broker/warehouse-backed adapters
//! plug in behind the same traits.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sift_core::CoreError;
use sift_engine::handlers::{BlobStore, ConnectorSource, DatasetSample, DiscoveredDataset, Warehouse};
use sift_ingest::{
    LogRecord, LogTransport, RegistryError, Schema, SchemaRegistry, TopicPartition, TransportError,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(text: &str) -> Option<Vec<u8>> {
    if text.len() % 2 != 0 {
        return None;
    }
    (0..text.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&text[i..i + 2], 16).ok())
        .collect()
}

fn io_err(path: &Path, e: std::io::Error) -> TransportError {
    TransportError::Unreachable(format!("{}: {e}", path.display()))
}

/// Directory-backed partitioned log.
///
/// Layout: `<root>/<topic>/<partition>.log` holds one hex-encoded payload
/// per line (the line number is the offset); `<root>/_offsets/` holds one
/// committed-offset file per `(group, topic, partition)`.
pub struct FileLog {
    root: PathBuf,
}

impl FileLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn partition_path(&self, tp: &TopicPartition) -> PathBuf {
        self.root.join(&tp.topic).join(format!("{}.log", tp.partition))
    }

    fn offset_path(&self, group_id: &str, tp: &TopicPartition) -> PathBuf {
        self.root
            .join("_offsets")
            .join(format!("{}__{}__{}", group_id, tp.topic, tp.partition))
    }

    /// Append a record locally (producer side of the dev loop).
    pub fn publish(&self, topic: &str, partition: i32, payload: &[u8]) -> Result<i64, TransportError> {
        let tp = TopicPartition::new(topic, partition);
        let path = self.partition_path(&tp);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        let existing = match std::fs::read_to_string(&path) {
            Ok(text) => text.lines().count() as i64,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(io_err(&path, e)),
        };
        let mut line = hex_encode(payload);
        line.push('\n');
        use std::io::Write as _;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| io_err(&path, e))?;
        file.write_all(line.as_bytes()).map_err(|e| io_err(&path, e))?;
        Ok(existing)
    }
}

#[async_trait]
impl LogTransport for FileLog {
    async fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Vec<TopicPartition>, TransportError> {
        if group_id.is_empty() {
            return Err(TransportError::Config("empty consumer group id".to_string()));
        }
        let mut assigned = Vec::new();
        for topic in topics {
            let dir = self.root.join(topic);
            let entries = std::fs::read_dir(&dir)
                .map_err(|e| TransportError::Config(format!("topic '{topic}': {e}")))?;
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let name = entry.file_name();
                let name = name.to_string_lossy();
                if let Some(partition) = name.strip_suffix(".log").and_then(|p| p.parse().ok()) {
                    assigned.push(TopicPartition::new(topic.as_str(), partition));
                }
            }
        }
        if assigned.is_empty() {
            return Err(TransportError::Config(format!("no partitions for topics {topics:?}")));
        }
        assigned.sort_by(|a, b| a.topic.cmp(&b.topic).then(a.partition.cmp(&b.partition)));
        Ok(assigned)
    }

    async fn poll(
        &self,
        tp: &TopicPartition,
        from_offset: i64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>, TransportError> {
        let path = self.partition_path(tp);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&path, e)),
        };
        let mut records = Vec::new();
        for (offset, line) in text.lines().enumerate() {
            if (offset as i64) < from_offset || records.len() >= max_records {
                continue;
            }
            let payload = hex_decode(line.trim()).ok_or_else(|| {
                TransportError::Unreachable(format!(
                    "corrupt record at {}:{offset}",
                    path.display()
                ))
            })?;
            records.push(LogRecord {
                topic: tp.topic.clone(),
                partition: tp.partition,
                offset: offset as i64,
                payload,
            });
        }
        Ok(records)
    }

    async fn commit(
        &self,
        group_id: &str,
        tp: &TopicPartition,
        offset: i64,
    ) -> Result<(), TransportError> {
        let path = self.offset_path(group_id, tp);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        std::fs::write(&path, offset.to_string()).map_err(|e| io_err(&path, e))
    }

    async fn committed(
        &self,
        group_id: &str,
        tp: &TopicPartition,
    ) -> Result<i64, TransportError> {
        let path = self.offset_path(group_id, tp);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text.trim().parse().unwrap_or(0)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn latest_offset(&self, tp: &TopicPartition) -> Result<i64, TransportError> {
        let path = self.partition_path(tp);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(text.lines().count() as i64),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(io_err(&path, e)),
        }
    }
}

/// Schema registry backed by a JSON file of [`Schema`] values.
pub struct FileRegistry {
    schemas: HashMap<u32, Schema>,
}

impl FileRegistry {
    /// Load `schemas.json` (an array of schemas). A missing file yields an
    /// empty registry, which only blocks framed records.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let schemas = match std::fs::read_to_string(path) {
            Ok(text) => {
                let list: Vec<Schema> = serde_json::from_str(&text).map_err(|e| {
                    CoreError::config(format!("bad schema file {}: {e}", path.display()))
                })?;
                list.into_iter().map(|s| (s.id, s)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(CoreError::config(format!(
                    "cannot read schema file {}: {e}",
                    path.display()
                )))
            }
        };
        Ok(Self { schemas })
    }
}

#[async_trait]
impl SchemaRegistry for FileRegistry {
    async fn fetch(&self, id: u32) -> Result<Schema, RegistryError> {
        self.schemas.get(&id).cloned().ok_or(RegistryError::NotFound(id))
    }
}

/// Filesystem blob store with hash-signed, time-limited URLs.
pub struct FsBlobStore {
    root: PathBuf,
    signing_key: String,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>, signing_key: impl Into<String>) -> Self {
        Self { root: root.into(), signing_key: signing_key.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, CoreError> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CoreError::transport(format!("blob mkdir: {e}")))?;
        }
        std::fs::write(&path, bytes)
            .map_err(|e| CoreError::transport(format!("blob write: {e}")))?;
        Ok(format!("file://{}", path.display()))
    }

    fn signed_url(&self, location: &str, ttl_ms: u64) -> String {
        let signature =
            Sha256::digest(format!("{}:{}:{}", self.signing_key, location, ttl_ms).as_bytes());
        format!("{location}?ttl={ttl_ms}&sig={}", hex_encode(&signature[..8]))
    }
}

/// Warehouse stub for the standalone daemon: statements are logged and
/// acknowledged. Deployments wire a real warehouse behind the trait.
#[derive(Default)]
pub struct LoggingWarehouse;

#[async_trait]
impl Warehouse for LoggingWarehouse {
    async fn execute(&self, statement: &str) -> Result<u64, CoreError> {
        info!(statement, "warehouse execute");
        Ok(0)
    }

    async fn query_scalar(&self, statement: &str) -> Result<f64, CoreError> {
        info!(statement, "warehouse scalar");
        Ok(0.0)
    }

    async fn query_rows(&self, statement: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        info!(statement, "warehouse rows");
        Ok(Vec::new())
    }
}

/// Connector source with nothing attached.
#[derive(Default)]
pub struct UnconfiguredConnectors;

#[async_trait]
impl ConnectorSource for UnconfiguredConnectors {
    async fn list_datasets(
        &self,
        connector_id: &str,
        _schema_filter: Option<&str>,
        _table_pattern: Option<&str>,
    ) -> Result<Vec<DiscoveredDataset>, CoreError> {
        Err(CoreError::permanent(format!("connector '{connector_id}' is not configured")))
    }

    async fn sample(&self, dataset_id: &str) -> Result<DatasetSample, CoreError> {
        Err(CoreError::permanent(format!("dataset '{dataset_id}' has no configured connector")))
    }
}

#[cfg(test)]
#[path = "adapters_tests.rs"]
mod tests;
