// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Fake collaborators for tests and local development.

use crate::handlers::seams::{
    AlertChannel, AlertFiring, BlobStore, ColumnSample, ConnectorSource, DatasetSample,
    DiscoveredDataset, Warehouse,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sift_core::CoreError;
use std::collections::HashMap;

/// In-memory warehouse with scripted results.
#[derive(Default)]
pub struct FakeWarehouse {
    pub executed: Mutex<Vec<String>>,
    scalars: Mutex<HashMap<String, f64>>,
    rows: Mutex<HashMap<String, Vec<serde_json::Value>>>,
    fail_substring: Mutex<Option<String>>,
}

impl FakeWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_scalar(&self, statement: &str, value: f64) {
        self.scalars.lock().insert(statement.to_string(), value);
    }

    pub fn set_rows(&self, statement: &str, rows: Vec<serde_json::Value>) {
        self.rows.lock().insert(statement.to_string(), rows);
    }

    /// Any statement containing `substring` fails with a transport error.
    pub fn fail_matching(&self, substring: &str) {
        *self.fail_substring.lock() = Some(substring.to_string());
    }

    fn check_failure(&self, statement: &str) -> Result<(), CoreError> {
        if let Some(substring) = self.fail_substring.lock().as_ref() {
            if statement.contains(substring.as_str()) {
                return Err(CoreError::transport("warehouse unreachable"));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn execute(&self, statement: &str) -> Result<u64, CoreError> {
        self.check_failure(statement)?;
        self.executed.lock().push(statement.to_string());
        Ok(1)
    }

    async fn query_scalar(&self, statement: &str) -> Result<f64, CoreError> {
        self.check_failure(statement)?;
        self.scalars
            .lock()
            .get(statement)
            .copied()
            .ok_or_else(|| CoreError::permanent(format!("no scalar scripted for '{statement}'")))
    }

    async fn query_rows(&self, statement: &str) -> Result<Vec<serde_json::Value>, CoreError> {
        self.check_failure(statement)?;
        Ok(self.rows.lock().get(statement).cloned().unwrap_or_default())
    }
}

/// In-memory blob store with deterministic signed URLs.
#[derive(Default)]
pub struct MemoryBlobStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, CoreError> {
        self.objects.lock().insert(key.to_string(), bytes);
        Ok(format!("mem://{key}"))
    }

    fn signed_url(&self, location: &str, ttl_ms: u64) -> String {
        format!("{location}?expires={ttl_ms}")
    }
}

/// Connector source with scripted datasets and samples.
#[derive(Default)]
pub struct FakeConnectorSource {
    datasets: Mutex<HashMap<String, Vec<DiscoveredDataset>>>,
    samples: Mutex<HashMap<String, DatasetSample>>,
    fail_sampling: Mutex<Vec<String>>,
}

impl FakeConnectorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dataset(&self, connector_id: &str, dataset: DiscoveredDataset) {
        self.datasets.lock().entry(connector_id.to_string()).or_default().push(dataset);
    }

    pub fn set_sample(&self, dataset_id: &str, columns: Vec<ColumnSample>) {
        self.samples
            .lock()
            .insert(dataset_id.to_string(), DatasetSample {
                dataset_id: dataset_id.to_string(),
                columns,
            });
    }

    pub fn fail_sampling(&self, dataset_id: &str) {
        self.fail_sampling.lock().push(dataset_id.to_string());
    }
}

#[async_trait]
impl ConnectorSource for FakeConnectorSource {
    async fn list_datasets(
        &self,
        connector_id: &str,
        schema_filter: Option<&str>,
        table_pattern: Option<&str>,
    ) -> Result<Vec<DiscoveredDataset>, CoreError> {
        let datasets = self.datasets.lock().get(connector_id).cloned().unwrap_or_default();
        Ok(datasets
            .into_iter()
            .filter(|d| schema_filter.map(|f| d.schema_name == f).unwrap_or(true))
            .filter(|d| table_pattern.map(|p| d.table_name.contains(p)).unwrap_or(true))
            .collect())
    }

    async fn sample(&self, dataset_id: &str) -> Result<DatasetSample, CoreError> {
        if self.fail_sampling.lock().iter().any(|d| d == dataset_id) {
            return Err(CoreError::transport(format!("sampling '{dataset_id}' failed")));
        }
        self.samples
            .lock()
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| CoreError::permanent(format!("no sample scripted for '{dataset_id}'")))
    }
}

/// Channel that records dispatches, optionally failing.
pub struct MemoryChannel {
    name: String,
    pub sent: Mutex<Vec<AlertFiring>>,
    fail: bool,
}

impl MemoryChannel {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), sent: Mutex::new(Vec::new()), fail: false }
    }

    pub fn failing(name: impl Into<String>) -> Self {
        Self { name: name.into(), sent: Mutex::new(Vec::new()), fail: true }
    }
}

#[async_trait]
impl AlertChannel for MemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn dispatch(&self, firing: &AlertFiring) -> Result<(), CoreError> {
        if self.fail {
            return Err(CoreError::transport("channel down"));
        }
        self.sent.lock().push(firing.clone());
        Ok(())
    }
}
