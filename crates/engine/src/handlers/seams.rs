// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Collaborator traits at the system boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::CoreError;

/// The analytical warehouse. The core never computes; it hands SQL to this
/// seam and records what comes back.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Run a statement for effect (view refresh). Returns affected rows.
    async fn execute(&self, statement: &str) -> Result<u64, CoreError>;

    /// Run a statement expected to yield a single numeric value.
    async fn query_scalar(&self, statement: &str) -> Result<f64, CoreError>;

    /// Run a statement yielding JSON rows (exports, report tables).
    async fn query_rows(&self, statement: &str) -> Result<Vec<serde_json::Value>, CoreError>;
}

/// A dataset surfaced by catalog discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDataset {
    pub id: String,
    pub schema_name: String,
    pub table_name: String,
    pub row_count: Option<u64>,
}

/// One column of a profiling sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSample {
    pub name: String,
    pub data_type: String,
    pub values: Vec<serde_json::Value>,
}

/// A sampled slice of a dataset for profiling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSample {
    pub dataset_id: String,
    pub columns: Vec<ColumnSample>,
}

/// A connected data source the catalog can enumerate and sample.
#[async_trait]
pub trait ConnectorSource: Send + Sync {
    async fn list_datasets(
        &self,
        connector_id: &str,
        schema_filter: Option<&str>,
        table_pattern: Option<&str>,
    ) -> Result<Vec<DiscoveredDataset>, CoreError>;

    async fn sample(&self, dataset_id: &str) -> Result<DatasetSample, CoreError>;
}

/// S3-style object store with signed URLs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under `key`; returns the storage location.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, CoreError>;

    /// Signed, time-limited URL for a stored location.
    fn signed_url(&self, location: &str, ttl_ms: u64) -> String;
}

/// A triggered alert, as handed to notification channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertFiring {
    pub alert_id: String,
    pub name: String,
    pub current: f64,
    pub baseline: Option<f64>,
    pub rule: String,
    pub tenant_id: Option<String>,
}

/// A notification channel (webhook, email bridge, ...).
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn dispatch(&self, firing: &AlertFiring) -> Result<(), CoreError>;
}
