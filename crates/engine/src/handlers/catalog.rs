// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `catalog_discovery` and `catalog_profile`.

use crate::error::HandlerError;
use crate::handlers::seams::{ColumnSample, ConnectorSource};
use crate::registry::{JobContext, JobHandler};
use async_trait::async_trait;
use serde::Deserialize;
use sift_core::Clock;
use sift_storage::{ColumnProfile, Dataset, LineageEdge, Store};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct DiscoveryPayload {
    connector_id: String,
    #[serde(default)]
    schema_filter: Option<String>,
    #[serde(default)]
    table_pattern: Option<String>,
}

/// Enumerate datasets from a connector and upsert catalog metadata.
/// Sequential per connector (enqueue dedup key is the connector id).
pub struct CatalogDiscoveryHandler<C: Clock> {
    store: Arc<Store>,
    source: Arc<dyn ConnectorSource>,
    clock: C,
}

impl<C: Clock> CatalogDiscoveryHandler<C> {
    pub fn new(store: Arc<Store>, source: Arc<dyn ConnectorSource>, clock: C) -> Self {
        Self { store, source, clock }
    }
}

#[async_trait]
impl<C: Clock> JobHandler for CatalogDiscoveryHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let DiscoveryPayload { connector_id, schema_filter, table_pattern } =
            serde_json::from_value(payload)
                .map_err(|e| HandlerError::Permanent(format!("bad discovery payload: {e}")))?;

        let datasets = self
            .source
            .list_datasets(&connector_id, schema_filter.as_deref(), table_pattern.as_deref())
            .await
            .map_err(HandlerError::from)?;

        let now = self.clock.epoch_ms();
        let discovered = datasets.len();
        for dataset in datasets {
            self.store
                .upsert_dataset(Dataset {
                    id: dataset.id.clone(),
                    connector_id: connector_id.clone(),
                    schema_name: dataset.schema_name,
                    table_name: dataset.table_name,
                    row_count: dataset.row_count,
                    discovered_at_ms: now,
                })
                .map_err(HandlerError::from)?;
            self.store
                .record_lineage(LineageEdge {
                    source_id: connector_id.clone(),
                    target_id: dataset.id,
                    kind: "contains".to_string(),
                })
                .map_err(HandlerError::from)?;
        }

        info!(connector = %connector_id, discovered, "catalog discovery finished");
        Ok(serde_json::json!({ "connector_id": connector_id, "discovered": discovered }))
    }
}

#[derive(Debug, Deserialize)]
struct ProfilePayload {
    dataset_ids: Vec<String>,
    #[serde(default)]
    include_pii_detection: bool,
}

/// Sample datasets and persist per-column statistics. A failure on one
/// column (or one dataset) does not abort the others.
pub struct CatalogProfileHandler<C: Clock> {
    store: Arc<Store>,
    source: Arc<dyn ConnectorSource>,
    clock: C,
}

impl<C: Clock> CatalogProfileHandler<C> {
    pub fn new(store: Arc<Store>, source: Arc<dyn ConnectorSource>, clock: C) -> Self {
        Self { store, source, clock }
    }

    fn profile_column(
        &self,
        dataset_id: &str,
        column: &ColumnSample,
        include_pii: bool,
        now_ms: u64,
    ) -> ColumnProfile {
        let total = column.values.len();
        let nulls = column.values.iter().filter(|v| v.is_null()).count();
        let distinct: HashSet<String> =
            column.values.iter().filter(|v| !v.is_null()).map(|v| v.to_string()).collect();

        let pii_kind = if include_pii { detect_pii(&column.name, &column.values) } else { None };

        ColumnProfile {
            dataset_id: dataset_id.to_string(),
            column_name: column.name.clone(),
            data_type: column.data_type.clone(),
            null_fraction: if total == 0 { 0.0 } else { nulls as f64 / total as f64 },
            distinct_count: distinct.len() as u64,
            pii_kind,
            profiled_at_ms: now_ms,
        }
    }
}

#[async_trait]
impl<C: Clock> JobHandler for CatalogProfileHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let ProfilePayload { dataset_ids, include_pii_detection } =
            serde_json::from_value(payload)
                .map_err(|e| HandlerError::Permanent(format!("bad profile payload: {e}")))?;

        let now = self.clock.epoch_ms();
        let mut profiled = 0usize;
        let mut failed = 0usize;

        for dataset_id in &dataset_ids {
            let sample = match self.source.sample(dataset_id).await {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(dataset = dataset_id.as_str(), error = %e, "sampling failed");
                    failed += 1;
                    continue;
                }
            };
            for column in &sample.columns {
                let profile =
                    self.profile_column(dataset_id, column, include_pii_detection, now);
                match self.store.record_column_profile(profile) {
                    Ok(()) => profiled += 1,
                    Err(e) => {
                        warn!(
                            dataset = dataset_id.as_str(),
                            column = column.name.as_str(),
                            error = %e,
                            "column profile not persisted"
                        );
                        failed += 1;
                    }
                }
            }
        }

        info!(datasets = dataset_ids.len(), profiled, failed, "catalog profiling finished");
        Ok(serde_json::json!({ "profiled_columns": profiled, "failed": failed }))
    }
}

/// Name- and value-based PII classification.
fn detect_pii(column_name: &str, values: &[serde_json::Value]) -> Option<String> {
    let name = column_name.to_ascii_lowercase();
    if name.contains("email") {
        return Some("email".to_string());
    }
    if name.contains("phone") {
        return Some("phone".to_string());
    }
    if name.contains("ssn") || name.contains("social_security") {
        return Some("national_id".to_string());
    }

    let sampled_strings: Vec<&str> = values.iter().filter_map(|v| v.as_str()).take(50).collect();
    if sampled_strings.is_empty() {
        return None;
    }
    let email_like = sampled_strings
        .iter()
        .filter(|s| s.contains('@') && s.rsplit_once('@').map(|(_, d)| d.contains('.')).unwrap_or(false))
        .count();
    if email_like * 2 > sampled_strings.len() {
        return Some("email".to_string());
    }
    None
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
