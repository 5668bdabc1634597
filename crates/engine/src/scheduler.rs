// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Cron scheduler.
//!
//! Evaluates schedules against the clock and enqueues jobs when their
//! `next_fire_at` passes. Fires missed during downtime are collapsed into a
//! single catch-up fire; the advance and the enqueue commit in one store
//! transaction, and the job's deduplication key
//! (`sched:{schedule_id}:{scheduled_for}`) absorbs the at-most-one
//! duplicate a crash between the two could otherwise produce.

use crate::error::EngineError;
use crate::queue::QueueEngine;
use sift_core::{Clock, CoreError, CronExpr, Metrics, ScheduleId};
use sift_storage::{Schedule, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval_ms: u64,
    /// Fires older than this are skipped instead of caught up.
    pub max_catchup_span_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { tick_interval_ms: 1_000, max_catchup_span_ms: 24 * 60 * 60 * 1000 }
    }
}

pub struct Scheduler<C: Clock> {
    store: Arc<Store>,
    clock: C,
    metrics: Arc<Metrics>,
    config: SchedulerConfig,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(engine: &QueueEngine<C>, config: SchedulerConfig) -> Self {
        Self {
            store: Arc::clone(engine.store()),
            clock: engine.clock().clone(),
            metrics: engine.metrics(),
            config,
        }
    }

    /// Create or replace a schedule. Validates the cron expression and
    /// computes the first fire strictly after now.
    pub fn upsert(
        &self,
        schedule_id: ScheduleId,
        cron_expr: &str,
        queue: impl Into<String>,
        job_kind: impl Into<String>,
        payload: serde_json::Value,
        tenant_id: Option<String>,
        enabled: bool,
    ) -> Result<Schedule, EngineError> {
        let cron = CronExpr::parse(cron_expr)
            .map_err(|e| CoreError::config(format!("invalid cron '{cron_expr}': {e}")))?;
        let now = self.clock.epoch_ms();
        let next_fire_at_ms = cron
            .next_after_ms(now)
            .ok_or_else(|| CoreError::config(format!("cron '{cron_expr}' never fires")))?;

        let schedule = Schedule {
            id: schedule_id,
            cron,
            queue: queue.into(),
            job_kind: job_kind.into(),
            payload,
            tenant_id,
            enabled,
            last_fired_at_ms: None,
            next_fire_at_ms,
        };
        self.store.upsert_schedule(schedule.clone())?;
        info!(schedule = %schedule.id, cron = cron_expr, next_fire_at_ms, "schedule upserted");
        Ok(schedule)
    }

    pub fn list(&self, enabled: Option<bool>) -> Vec<Schedule> {
        self.store.list_schedules(enabled)
    }

    pub fn disable(&self, schedule_id: &ScheduleId) -> Result<(), EngineError> {
        self.store.set_schedule_enabled(schedule_id, false)?;
        Ok(())
    }

    pub fn delete(&self, schedule_id: &ScheduleId) -> Result<(), EngineError> {
        self.store.delete_schedule(schedule_id)?;
        Ok(())
    }

    /// Fire every due schedule once. Returns the number of jobs enqueued.
    ///
    /// A schedule whose fire time fell behind by more than one boundary gets
    /// exactly one catch-up fire; one outside the catch-up span is advanced
    /// without firing.
    pub fn fire_due(&self, now_ms: u64) -> Result<usize, EngineError> {
        let mut fired = 0;
        for schedule in self.store.due_schedules(now_ms) {
            let scheduled_for = schedule.next_fire_at_ms;
            let next_fire_at_ms = match schedule.cron.next_after_ms(now_ms) {
                Some(next) => next,
                None => {
                    warn!(schedule = %schedule.id, "cron has no future fire; disabling");
                    self.store.set_schedule_enabled(&schedule.id, false)?;
                    continue;
                }
            };

            if now_ms.saturating_sub(scheduled_for) > self.config.max_catchup_span_ms {
                // Too stale to catch up: advance without enqueue.
                info!(
                    schedule = %schedule.id,
                    scheduled_for,
                    "fire outside catch-up span, skipping"
                );
                self.store.advance_schedule(&schedule.id, now_ms, next_fire_at_ms)?;
                continue;
            }

            let (job_id, fresh) = self.store.fire_schedule(
                &schedule.id,
                &schedule.queue,
                &schedule.job_kind,
                schedule.payload.clone(),
                self.fire_options(&schedule, scheduled_for),
                now_ms,
                next_fire_at_ms,
            )?;
            if fresh {
                fired += 1;
                self.metrics.incr_jobs_enqueued();
                self.metrics.incr_schedules_fired();
                debug!(
                    schedule = %schedule.id,
                    job = %job_id,
                    scheduled_for,
                    next_fire_at_ms,
                    "schedule fired"
                );
            } else {
                debug!(schedule = %schedule.id, job = %job_id, "fire deduplicated");
            }
        }
        Ok(fired)
    }

    fn fire_options(&self, schedule: &Schedule, scheduled_for: u64) -> sift_core::EnqueueOptions {
        let mut opts = sift_core::EnqueueOptions::default()
            .deduplication_key(format!("sched:{}:{}", schedule.id, scheduled_for));
        if let Some(tenant) = &schedule.tenant_id {
            opts = opts.tenant(tenant.as_str());
        }
        opts
    }

    /// Periodic tick loop.
    pub async fn run(self, shutdown: CancellationToken) {
        let interval = Duration::from_millis(self.config.tick_interval_ms);
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => break,
            }
            let now = self.clock.epoch_ms();
            if let Err(e) = self.fire_due(now) {
                warn!(error = %e, "scheduler tick failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
