// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `export_render`: materialize an export artifact into blob storage and
//! record its signed URL.

use crate::error::HandlerError;
use crate::handlers::seams::{BlobStore, Warehouse};
use crate::registry::{JobContext, JobHandler};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use sift_core::Clock;
use sift_storage::{Artifact, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Registered export definition.
#[derive(Debug, Clone)]
pub struct ExportSpec {
    pub export_id: String,
    pub statement: String,
    /// "csv" or "json".
    pub format: String,
    pub url_ttl_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ExportPayload {
    export_job_id: String,
}

pub struct ExportRenderHandler<C: Clock> {
    store: Arc<Store>,
    warehouse: Arc<dyn Warehouse>,
    blobs: Arc<dyn BlobStore>,
    clock: C,
    specs: HashMap<String, ExportSpec>,
}

impl<C: Clock> ExportRenderHandler<C> {
    pub fn new(
        store: Arc<Store>,
        warehouse: Arc<dyn Warehouse>,
        blobs: Arc<dyn BlobStore>,
        clock: C,
        specs: HashMap<String, ExportSpec>,
    ) -> Self {
        Self { store, warehouse, blobs, clock, specs }
    }
}

#[async_trait]
impl<C: Clock> JobHandler for ExportRenderHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let ExportPayload { export_job_id } = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Permanent(format!("bad export payload: {e}")))?;

        let spec = self
            .specs
            .get(&export_job_id)
            .ok_or_else(|| {
                HandlerError::Permanent(format!("no export registered for '{export_job_id}'"))
            })?
            .clone();

        let rows = self.warehouse.query_rows(&spec.statement).await.map_err(HandlerError::from)?;
        let bytes = render(&rows, &spec.format)?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        let key = format!("exports/{}/{}.{}", export_job_id, sha256, spec.format);
        let location = self.blobs.put(&key, bytes).await.map_err(HandlerError::from)?;
        let signed_url = self.blobs.signed_url(&location, spec.url_ttl_ms);

        let now = self.clock.epoch_ms();
        let artifact = Artifact {
            id: format!("export:{export_job_id}:{sha256}"),
            kind: "export".to_string(),
            location,
            signed_url: signed_url.clone(),
            url_expires_at_ms: now + spec.url_ttl_ms,
            sha256,
            created_at_ms: now,
        };
        let artifact_id = artifact.id.clone();
        self.store.record_artifact(artifact).map_err(HandlerError::from)?;

        info!(export = %export_job_id, rows = rows.len(), artifact = %artifact_id, "export rendered");
        Ok(serde_json::json!({
            "export_job_id": export_job_id,
            "artifact_id": artifact_id,
            "signed_url": signed_url,
            "rows": rows.len(),
        }))
    }
}

fn render(rows: &[serde_json::Value], format: &str) -> Result<Vec<u8>, HandlerError> {
    match format {
        "json" => serde_json::to_vec_pretty(rows)
            .map_err(|e| HandlerError::Permanent(format!("render failed: {e}"))),
        "csv" => Ok(render_csv(rows).into_bytes()),
        other => Err(HandlerError::Permanent(format!("unsupported export format '{other}'"))),
    }
}

/// Minimal CSV rendering: header from the first row's keys, values
/// stringified, quotes doubled.
fn render_csv(rows: &[serde_json::Value]) -> String {
    let mut out = String::new();
    let headers: Vec<String> = match rows.first().and_then(|r| r.as_object()) {
        Some(first) => first.keys().cloned().collect(),
        None => return out,
    };
    out.push_str(&headers.join(","));
    out.push('\n');
    for row in rows {
        let fields: Vec<String> = headers
            .iter()
            .map(|h| {
                let value = row.get(h).cloned().unwrap_or(serde_json::Value::Null);
                match value {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => {
                        if s.contains(',') || s.contains('"') || s.contains('\n') {
                            format!("\"{}\"", s.replace('"', "\"\""))
                        } else {
                            s
                        }
                    }
                    other => other.to_string(),
                }
            })
            .collect();
        out.push_str(&fields.join(","));
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "export_tests.rs"]
mod tests;
