// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! The ingestion handler: idempotent landing of validated events.
//!
//! The staging insert and the event-log insert commit in one store
//! transaction; this module never takes application-level locks. Transient
//! storage failures are retried here within a bounded budget — exhausting
//! it surfaces `FailedTransient`, which tells the consumer to hold the
//! offset and try again later.

use crate::transport::TopicPartition;
use sift_core::{
    BackoffPolicy, Clock, CoreError, EventEnvelope, IngestOutcome, Metrics, ProcessingStatus,
};
use sift_storage::{EventLogEntry, EventOrigin, StagingRow, Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    /// Bounded in-handler retries for transient storage errors.
    pub max_transient_retries: u32,
    pub retry_backoff: BackoffPolicy,
    /// Concurrent accepts across all partitions; the consumer pauses
    /// partitions when no permit is available.
    pub max_inflight: usize,
    /// Partitions resume when at least this many permits are free.
    pub resume_low_water: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: 3,
            retry_backoff: BackoffPolicy::new(50, 2_000, true),
            max_inflight: 64,
            resume_low_water: 16,
        }
    }
}

pub struct IngestionHandler<C: Clock> {
    store: Arc<Store>,
    clock: C,
    metrics: Arc<Metrics>,
    config: IngestionConfig,
    inflight: Arc<Semaphore>,
}

impl<C: Clock> IngestionHandler<C> {
    pub fn new(store: Arc<Store>, clock: C, metrics: Arc<Metrics>, config: IngestionConfig) -> Self {
        let inflight = Arc::new(Semaphore::new(config.max_inflight));
        Self { store, clock, metrics, config, inflight }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Saturation gate: `None` means the consumer should pause the partition.
    pub fn try_begin(&self) -> Option<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.inflight).try_acquire_owned().ok()
    }

    /// Whether enough capacity is free to resume paused partitions.
    pub fn below_low_water(&self) -> bool {
        self.inflight.available_permits() >= self.config.resume_low_water.max(1)
    }

    /// Land one validated envelope. `Err` means the outcome's log row could
    /// not be written even after the retry budget; the caller must not
    /// commit the offset (and halts the partition when the error is not
    /// retryable).
    pub async fn accept(
        &self,
        envelope: &EventEnvelope,
        origin: EventOrigin,
    ) -> Result<IngestOutcome, CoreError> {
        if envelope.tenant_id.is_empty() {
            self.log_with_retry(self.entry(
                &envelope.event_id,
                &origin,
                None,
                ProcessingStatus::Failed,
                Some("missing_tenant".to_string()),
                0,
            ))
            .await?;
            self.metrics.incr_events_failed();
            return Ok(IngestOutcome::FailedPermanent);
        }

        let kind = envelope.event_type.staging_kind();
        let row = StagingRow {
            event_id: envelope.event_id.clone(),
            tenant_id: envelope.tenant_id.clone(),
            event_timestamp_ms: envelope.timestamp_ms(),
            event_type: envelope.event_type,
            processed_at_ms: self.clock.epoch_ms(),
            payload_json: envelope.data.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            let entry = self.entry(
                &envelope.event_id,
                &origin,
                Some(envelope.tenant_id.clone()),
                ProcessingStatus::Processed,
                None,
                attempt,
            );
            match self.store.accept_event(kind, row.clone(), entry) {
                Ok(()) => {
                    self.metrics.incr_events_processed();
                    debug!(event = envelope.event_id.as_str(), %origin.topic, "event landed");
                    return Ok(IngestOutcome::Processed);
                }
                Err(StoreError::DuplicateEvent(_)) => {
                    self.log_with_retry(self.entry(
                        &envelope.event_id,
                        &origin,
                        Some(envelope.tenant_id.clone()),
                        ProcessingStatus::Skipped,
                        None,
                        attempt,
                    ))
                    .await?;
                    self.metrics.incr_events_skipped();
                    return Ok(IngestOutcome::SkippedDuplicate);
                }
                Err(StoreError::PartitionMissing { partition_key, .. }) => {
                    self.log_with_retry(self.entry(
                        &envelope.event_id,
                        &origin,
                        Some(envelope.tenant_id.clone()),
                        ProcessingStatus::Failed,
                        Some("partition_missing".to_string()),
                        attempt,
                    ))
                    .await?;
                    self.metrics.incr_events_failed();
                    warn!(
                        event = envelope.event_id.as_str(),
                        partition_key, "event older than retention, discarded"
                    );
                    return Ok(IngestOutcome::FailedPermanent);
                }
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt > self.config.max_transient_retries {
                        warn!(
                            event = envelope.event_id.as_str(),
                            attempts = attempt,
                            error = %e,
                            "transient storage failure budget exhausted"
                        );
                        return Ok(IngestOutcome::FailedTransient);
                    }
                    let delay =
                        self.config.retry_backoff.delay_ms(attempt, &envelope.event_id);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => {
                    // Non-duplicate constraint violation: permanent for the
                    // record. Log it as failed and let the offset advance.
                    self.log_with_retry(self.entry(
                        &envelope.event_id,
                        &origin,
                        Some(envelope.tenant_id.clone()),
                        ProcessingStatus::Failed,
                        Some(format!("constraint: {e}")),
                        attempt,
                    ))
                    .await?;
                    self.metrics.incr_events_failed();
                    warn!(
                        event = envelope.event_id.as_str(),
                        error = %e,
                        "event rejected by storage constraint, discarded"
                    );
                    return Ok(IngestOutcome::FailedPermanent);
                }
            }
        }
    }

    /// Record a decode-skip (`decode_failed`) for a record that never made
    /// it to an envelope.
    pub async fn record_decode_skip(
        &self,
        event_id: Option<&str>,
        origin: EventOrigin,
        detail: &str,
    ) -> Result<(), CoreError> {
        let synthetic_id = event_id.map(|id| id.to_string()).unwrap_or_else(|| {
            format!("{}:{}:{}", origin.topic, origin.partition, origin.offset)
        });
        self.log_with_retry(EventLogEntry {
            event_id: synthetic_id,
            topic: origin.topic,
            partition: origin.partition,
            offset: origin.offset,
            tenant_id: None,
            status: ProcessingStatus::Skipped,
            processed_at_ms: self.clock.epoch_ms(),
            error_message: Some(format!("decode_failed: {detail}")),
            retry_count: 0,
        })
        .await?;
        self.metrics.incr_events_skipped();
        Ok(())
    }

    fn entry(
        &self,
        event_id: &str,
        origin: &EventOrigin,
        tenant_id: Option<String>,
        status: ProcessingStatus,
        error_message: Option<String>,
        retry_count: u32,
    ) -> EventLogEntry {
        EventLogEntry {
            event_id: event_id.to_string(),
            topic: origin.topic.clone(),
            partition: origin.partition,
            offset: origin.offset,
            tenant_id,
            status,
            processed_at_ms: self.clock.epoch_ms(),
            error_message,
            retry_count,
        }
    }

    /// Append a log row, retrying transient failures within the same budget
    /// as the main insert. Giving up is an error the consumer treats as
    /// "do not commit the offset".
    async fn log_with_retry(&self, entry: EventLogEntry) -> Result<(), CoreError> {
        let mut attempt: u32 = 0;
        loop {
            match self.store.append_log(entry.clone()) {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.max_transient_retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff.delay_ms(attempt, &entry.event_id);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                Err(e) => return Err(CoreError::transient_storage(e.to_string())),
            }
        }
    }
}

/// Origin helper for consumer call sites.
pub fn origin_of(tp: &TopicPartition, offset: i64) -> EventOrigin {
    EventOrigin::new(tp.topic.clone(), tp.partition, offset)
}

#[cfg(test)]
#[path = "ingestion_tests.rs"]
mod tests;
