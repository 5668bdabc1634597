// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Administrative control plane.
//!
//! Not a user CLI: this is the in-process operational surface callers embed
//! or expose. Background failures never cross this boundary as panics; an
//! operation returns the error taxonomy with counts where the contract
//! calls for them.

use crate::lifecycle::Daemon;
use serde::{Deserialize, Serialize};
use sift_core::{CoreError, JobId, MetricsSnapshot, ScheduleId};
use sift_engine::handlers::ReplayReport;
use sift_engine::EngineError;
use sift_storage::{QueueStats, Schedule};
use std::sync::Arc;

/// Result of an administrative replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOutcome {
    pub topic: String,
    pub partition: i32,
    pub from_offset: i64,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Handle to the operational surface of a running daemon.
#[derive(Clone)]
pub struct Admin {
    daemon: Arc<Daemon>,
}

impl Admin {
    pub fn new(daemon: Arc<Daemon>) -> Self {
        Self { daemon }
    }

    pub async fn start_ingestion(&self) -> Result<(), CoreError> {
        self.daemon.start_ingestion().await
    }

    pub async fn stop_ingestion(&self) {
        self.daemon.stop_ingestion().await
    }

    /// Replay a topic/partition from an offset, reporting outcome counts.
    pub async fn replay(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
    ) -> Result<ReplayOutcome, CoreError> {
        let ReplayReport { processed, skipped, failed } =
            self.daemon.consumer.replay(topic, partition, from_offset).await?;
        Ok(ReplayOutcome {
            topic: topic.to_string(),
            partition,
            from_offset,
            processed,
            skipped,
            failed,
        })
    }

    /// Enqueue an ad-hoc job of a known kind with the queue's defaults.
    ///
    /// `refresh_view` jobs coalesce per view: concurrent submissions for the
    /// same view return the already-queued job.
    pub fn enqueue(
        &self,
        queue: &str,
        job_kind: &str,
        payload: serde_json::Value,
    ) -> Result<JobId, EngineError> {
        let mut opts = self.daemon.engine.default_options(queue)?;
        if job_kind == "refresh_view" {
            if let Some(view) = payload.get("view_name").and_then(|v| v.as_str()) {
                opts = opts.deduplication_key(view);
            }
        }
        self.daemon.engine.enqueue(queue, job_kind, payload, opts)
    }

    pub fn cancel_job(&self, job_id: &JobId) -> Result<bool, EngineError> {
        self.daemon.engine.cancel(job_id)
    }

    pub fn upsert_schedule(
        &self,
        schedule_id: ScheduleId,
        cron_expr: &str,
        queue: &str,
        job_kind: &str,
        payload: serde_json::Value,
        tenant_id: Option<String>,
    ) -> Result<Schedule, EngineError> {
        self.daemon.scheduler.upsert(
            schedule_id,
            cron_expr,
            queue,
            job_kind,
            payload,
            tenant_id,
            true,
        )
    }

    pub fn disable_schedule(&self, schedule_id: &ScheduleId) -> Result<(), EngineError> {
        self.daemon.scheduler.disable(schedule_id)
    }

    pub fn schedules(&self, enabled: Option<bool>) -> Vec<Schedule> {
        self.daemon.scheduler.list(enabled)
    }

    pub fn queue_stats(&self, queue: &str) -> Result<QueueStats, EngineError> {
        self.daemon.engine.stats(queue)
    }

    /// Ingestion and job counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.daemon.metrics.snapshot()
    }

    /// Force-invalidate cached results by key prefix.
    pub fn invalidate_cache(&self, prefix: &str) -> usize {
        self.daemon.orchestrator.invalidate(prefix)
    }
}
