// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `crm_ingest_offset`: reposition a consumer and re-read a range.

use crate::error::HandlerError;
use crate::registry::{JobContext, JobHandler};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sift_core::CoreError;
use std::sync::Arc;
use tracing::info;

/// Counts from a replayed range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Control seam into the stream consumer, implemented by the ingestion
/// layer and handed to the engine at startup.
#[async_trait]
pub trait IngestControl: Send + Sync {
    /// Re-read `topic`/`partition` from `offset` through the ingestion
    /// handler. Idempotency absorbs everything already landed.
    async fn replay(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<ReplayReport, CoreError>;
}

#[derive(Debug, Deserialize)]
struct ReplayPayload {
    topic: String,
    partition: i32,
    offset: i64,
}

pub struct CrmIngestOffsetHandler {
    control: Arc<dyn IngestControl>,
}

impl CrmIngestOffsetHandler {
    pub fn new(control: Arc<dyn IngestControl>) -> Self {
        Self { control }
    }
}

#[async_trait]
impl JobHandler for CrmIngestOffsetHandler {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let ReplayPayload { topic, partition, offset } = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Permanent(format!("bad replay payload: {e}")))?;

        let report =
            self.control.replay(&topic, partition, offset).await.map_err(HandlerError::from)?;

        info!(
            %topic,
            partition,
            offset,
            processed = report.processed,
            skipped = report.skipped,
            failed = report.failed,
            "replay finished"
        );
        serde_json::to_value(report)
            .map_err(|e| HandlerError::Permanent(format!("report serialization: {e}")))
    }
}
