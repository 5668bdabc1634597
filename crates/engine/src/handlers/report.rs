// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `report_generate`: compose metrics and narrative into an artifact and
//! record the generation.

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

/// Registered report definition.
#[derive(Debug, Clone)]
pub struct ReportSpec {
    pub report_id: String,
    pub title: String,
    /// `(label, scalar statement)` pairs composed into the report body.
    pub metrics: Vec<(String, String)>,
    /// Narrative prefix rendered above the metric table.
    pub narrative: String,
    pub url_ttl_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ReportPayload {
    report_id: String,
}

pub struct ReportGenerateHandler<C: Clock> {
    store: Arc<Store>,
    warehouse: Arc<dyn Warehouse>,
    blobs: Arc<dyn BlobStore>,
    clock: C,
    specs: HashMap<String, ReportSpec>,
}

impl<C: Clock> ReportGenerateHandler<C> {
    pub fn new(
        store: Arc<Store>,
        warehouse: Arc<dyn Warehouse>,
        blobs: Arc<dyn BlobStore>,
        clock: C,
        specs: HashMap<String, ReportSpec>,
    ) -> Self {
        Self { store, warehouse, blobs, clock, specs }
    }
}

#[async_trait]
impl<C: Clock> JobHandler for ReportGenerateHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let ReportPayload { report_id } = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Permanent(format!("bad report payload: {e}")))?;

        let spec = self
            .specs
            .get(&report_id)
            .ok_or_else(|| {
                HandlerError::Permanent(format!("no report registered for '{report_id}'"))
            })?
            .clone();

        let mut body = format!("# {}\n\n{}\n\n", spec.title, spec.narrative);
        for (label, statement) in &spec.metrics {
            let value =
                self.warehouse.query_scalar(statement).await.map_err(HandlerError::from)?;
            body.push_str(&format!("- {label}: {value}\n"));
        }

        let bytes = body.into_bytes();
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        let key = format!("reports/{}/{}.md", report_id, sha256);
        let location = self.blobs.put(&key, bytes).await.map_err(HandlerError::from)?;
        let signed_url = self.blobs.signed_url(&location, spec.url_ttl_ms);

        let now = self.clock.epoch_ms();
        let artifact = Artifact {
            id: format!("report:{report_id}:{sha256}"),
            kind: "report".to_string(),
            location,
            signed_url: signed_url.clone(),
            url_expires_at_ms: now + spec.url_ttl_ms,
            sha256,
            created_at_ms: now,
        };
        let artifact_id = artifact.id.clone();
        self.store.record_artifact(artifact).map_err(HandlerError::from)?;

        info!(report = %report_id, artifact = %artifact_id, "report generated");
        Ok(serde_json::json!({
            "report_id": report_id,
            "artifact_id": artifact_id,
            "signed_url": signed_url,
        }))
    }
}
