// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! The stream consumer: one task per assigned partition.
//!
//! Records are delivered strictly in offset order per partition; the offset
//! is committed only after the ingestion handler durably settles the record
//! (processed, skipped, or permanently failed). Transport errors reconnect
//! with jittered exponential backoff. Saturation pauses the partition until
//! the handler drops below its low-water mark.

use crate::decode::decode_record;
use crate::ingestion::{origin_of, IngestionHandler};
use crate::registry::{CachingSchemaClient, SchemaRegistry};
use crate::transport::{LogRecord, LogTransport, TopicPartition, TransportError};
use parking_lot::Mutex;
use sift_core::{BackoffPolicy, Clock, CoreError, IngestOutcome, Metrics};
use sift_engine::handlers::{AlertChannel, AlertFiring, IngestControl, ReplayReport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub topics: Vec<String>,
    pub group_id: String,
    pub poll_batch: usize,
    pub poll_interval_ms: u64,
    pub handshake_timeout_ms: u64,
    pub reconnect_backoff: BackoffPolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            group_id: "sift-ingest".to_string(),
            poll_batch: 64,
            poll_interval_ms: 20,
            handshake_timeout_ms: 10_000,
            reconnect_backoff: BackoffPolicy::new(100, 30_000, true),
        }
    }
}

#[derive(Default)]
struct PartitionControl {
    paused: bool,
    /// Requested reposition; picked up at the top of the partition loop.
    seek_to: Option<i64>,
}

pub struct StreamConsumer<T, R, C: Clock> {
    transport: Arc<T>,
    registry: Arc<CachingSchemaClient<R>>,
    handler: Arc<IngestionHandler<C>>,
    metrics: Arc<Metrics>,
    config: ConsumerConfig,
    controls: Arc<Mutex<HashMap<TopicPartition, PartitionControl>>>,
    /// Channels notified when a partition halts on an unexpected error.
    fatal_alerts: Mutex<Vec<Arc<dyn AlertChannel>>>,
}

impl<T, R, C> StreamConsumer<T, R, C>
where
    T: LogTransport,
    R: SchemaRegistry,
    C: Clock,
{
    pub fn new(
        transport: Arc<T>,
        registry: Arc<CachingSchemaClient<R>>,
        handler: Arc<IngestionHandler<C>>,
        metrics: Arc<Metrics>,
        config: ConsumerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            registry,
            handler,
            metrics,
            config,
            controls: Arc::new(Mutex::new(HashMap::new())),
            fatal_alerts: Mutex::new(Vec::new()),
        })
    }

    /// Register a channel for fatal partition-halt alerts.
    pub fn add_fatal_alert_channel(&self, channel: Arc<dyn AlertChannel>) {
        self.fatal_alerts.lock().push(channel);
    }

    /// A partition halted on an unclassifiable error: count it, log it, and
    /// dispatch to every registered alert channel.
    async fn emit_fatal(&self, tp: &TopicPartition, offset: i64, reason: &str) {
        self.metrics.incr_partitions_halted();
        error!(%tp, offset, reason, "partition halted");

        let firing = AlertFiring {
            alert_id: format!("ingest:{tp}"),
            name: "ingest partition halted".to_string(),
            current: offset as f64,
            baseline: None,
            rule: reason.to_string(),
            tenant_id: None,
        };
        let channels: Vec<Arc<dyn AlertChannel>> = self.fatal_alerts.lock().clone();
        for channel in channels {
            if let Err(e) = channel.dispatch(&firing).await {
                warn!(%tp, channel = channel.name(), error = %e, "fatal alert dispatch failed");
            }
        }
    }

    /// Join the group and start one task per assigned partition.
    pub async fn start(self: &Arc<Self>) -> Result<ConsumerHandle, CoreError> {
        let subscribe = self.transport.subscribe(&self.config.topics, &self.config.group_id);
        let timeout = Duration::from_millis(self.config.handshake_timeout_ms);
        let assigned = match tokio::time::timeout(timeout, subscribe).await {
            Ok(Ok(assigned)) => assigned,
            Ok(Err(TransportError::Config(msg))) => return Err(CoreError::config(msg)),
            Ok(Err(TransportError::Unreachable(msg))) => return Err(CoreError::transport(msg)),
            Err(_) => {
                return Err(CoreError::transport(format!(
                    "log handshake exceeded {}ms",
                    self.config.handshake_timeout_ms
                )))
            }
        };
        info!(partitions = assigned.len(), group = self.config.group_id.as_str(), "consuming");

        let cancel = CancellationToken::new();
        let mut tasks = Vec::with_capacity(assigned.len());
        for tp in &assigned {
            self.controls.lock().entry(tp.clone()).or_default();
            let consumer = Arc::clone(self);
            let tp = tp.clone();
            let cancel = cancel.clone();
            tasks.push(tokio::spawn(async move {
                consumer.partition_loop(tp, cancel).await;
            }));
        }

        Ok(ConsumerHandle { cancel, tasks, assigned, controls: Arc::clone(&self.controls) })
    }

    async fn partition_loop(self: Arc<Self>, tp: TopicPartition, cancel: CancellationToken) {
        let mut position = loop {
            match self.transport.committed(&self.config.group_id, &tp).await {
                Ok(offset) => break offset,
                Err(e) => {
                    warn!(%tp, error = %e, "cannot read committed offset, retrying");
                    if self.sleep_or_cancel(&cancel, 500).await {
                        return;
                    }
                }
            }
        };
        debug!(%tp, position, "partition loop started");
        let mut reconnect_attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            if let Some(seek_to) = self.controls.lock().get_mut(&tp).and_then(|c| c.seek_to.take())
            {
                info!(%tp, seek_to, "repositioning");
                position = seek_to;
            }

            if self.is_paused(&tp) {
                if self.handler.below_low_water() {
                    self.set_paused(&tp, false);
                    info!(%tp, "partition resumed");
                } else if self.sleep_or_cancel(&cancel, self.config.poll_interval_ms).await {
                    break;
                }
                continue;
            }

            let records = match self
                .transport
                .poll(&tp, position, self.config.poll_batch)
                .await
            {
                Ok(records) => {
                    reconnect_attempt = 0;
                    records
                }
                Err(TransportError::Config(msg)) => {
                    self.emit_fatal(&tp, position, &format!("log config: {msg}")).await;
                    return;
                }
                Err(TransportError::Unreachable(msg)) => {
                    reconnect_attempt += 1;
                    let delay = self
                        .config
                        .reconnect_backoff
                        .delay_ms(reconnect_attempt, &tp.to_string());
                    warn!(%tp, error = %msg, reconnect_attempt, delay, "poll failed, backing off");
                    if self.sleep_or_cancel(&cancel, delay).await {
                        break;
                    }
                    continue;
                }
            };

            if records.is_empty() {
                if self.sleep_or_cancel(&cancel, self.config.poll_interval_ms).await {
                    break;
                }
                continue;
            }

            for record in records {
                match self.settle_record(&tp, &record, &cancel).await {
                    Settled::Advanced => position = record.offset + 1,
                    Settled::Cancelled => return,
                    Settled::Halted(reason) => {
                        self.emit_fatal(&tp, record.offset, &reason).await;
                        return;
                    }
                }
            }
        }
        debug!(%tp, "partition loop drained");
    }

    /// Drive one record to a durable settle, committing its offset.
    async fn settle_record(
        &self,
        tp: &TopicPartition,
        record: &LogRecord,
        cancel: &CancellationToken,
    ) -> Settled {
        loop {
            if cancel.is_cancelled() {
                return Settled::Cancelled;
            }

            // Saturation gate: pause the partition instead of queueing.
            let permit = match self.handler.try_begin() {
                Some(permit) => permit,
                None => {
                    if !self.is_paused(tp) {
                        self.set_paused(tp, true);
                        self.metrics.incr_partitions_paused();
                        info!(%tp, "partition paused (handler saturated)");
                    }
                    if self.sleep_or_cancel(cancel, self.config.poll_interval_ms).await {
                        return Settled::Cancelled;
                    }
                    if self.handler.below_low_water() {
                        self.set_paused(tp, false);
                    }
                    continue;
                }
            };

            let origin = origin_of(tp, record.offset);
            let outcome = match decode_record(record, &self.registry).await {
                Ok(envelope) => match self.handler.accept(&envelope, origin).await {
                    Ok(outcome) => outcome,
                    Err(e) if e.is_retryable() => {
                        drop(permit);
                        warn!(%tp, offset = record.offset, error = %e, "accept failed, retrying");
                        if self.sleep_or_cancel(cancel, 500).await {
                            return Settled::Cancelled;
                        }
                        continue;
                    }
                    Err(e) => {
                        return Settled::Halted(format!("unexpected accept failure: {e}"));
                    }
                },
                Err(e) if e.is_retryable() => {
                    drop(permit);
                    warn!(%tp, offset = record.offset, error = %e, "decode blocked on registry");
                    if self.sleep_or_cancel(cancel, 500).await {
                        return Settled::Cancelled;
                    }
                    continue;
                }
                Err(e) => {
                    // Permanent decode failure: skip and advance.
                    let skip = self
                        .handler
                        .record_decode_skip(None, origin, &e.to_string())
                        .await;
                    drop(permit);
                    match skip {
                        Ok(()) => IngestOutcome::SkippedDuplicate,
                        Err(skip_err) if skip_err.is_retryable() => {
                            if self.sleep_or_cancel(cancel, 500).await {
                                return Settled::Cancelled;
                            }
                            continue;
                        }
                        Err(skip_err) => {
                            return Settled::Halted(format!(
                                "could not log decode skip: {skip_err}"
                            ));
                        }
                    }
                }
            };

            match outcome {
                IngestOutcome::FailedTransient => {
                    // Offset must not move; retry the record.
                    if self.sleep_or_cancel(cancel, 500).await {
                        return Settled::Cancelled;
                    }
                    continue;
                }
                _ => {
                    if let Err(e) = self
                        .transport
                        .commit(&self.config.group_id, tp, record.offset + 1)
                        .await
                    {
                        // The write is durable; a failed commit only means
                        // re-delivery, which idempotency absorbs.
                        warn!(%tp, offset = record.offset, error = %e, "offset commit failed");
                    }
                    return Settled::Advanced;
                }
            }
        }
    }

    /// Re-read a range through the ingestion handler, counting outcomes.
    /// Also rewinds the group's committed offset to `from_offset` first so
    /// a restarted consumer observes the same replay.
    pub async fn replay(
        &self,
        topic: &str,
        partition: i32,
        from_offset: i64,
    ) -> Result<ReplayReport, CoreError> {
        let tp = TopicPartition::new(topic, partition);
        let to_core = |e: TransportError| match e {
            TransportError::Config(msg) => CoreError::config(msg),
            TransportError::Unreachable(msg) => CoreError::transport(msg),
        };

        let end = self.transport.latest_offset(&tp).await.map_err(to_core)?;
        self.transport
            .commit(&self.config.group_id, &tp, from_offset)
            .await
            .map_err(to_core)?;
        // Nudge a live partition loop back as well.
        if let Some(control) = self.controls.lock().get_mut(&tp) {
            control.seek_to = Some(from_offset);
        }

        let mut report = ReplayReport::default();
        let mut position = from_offset;
        while position < end {
            let records = self
                .transport
                .poll(&tp, position, self.config.poll_batch)
                .await
                .map_err(to_core)?;
            if records.is_empty() {
                break;
            }
            for record in records {
                if record.offset >= end {
                    break;
                }
                let origin = origin_of(&tp, record.offset);
                match decode_record(&record, &self.registry).await {
                    Ok(envelope) => match self.handler.accept(&envelope, origin).await? {
                        IngestOutcome::Processed => report.processed += 1,
                        IngestOutcome::SkippedDuplicate => report.skipped += 1,
                        IngestOutcome::FailedPermanent => report.failed += 1,
                        IngestOutcome::FailedTransient => {
                            return Err(CoreError::transient_storage(format!(
                                "replay stalled at {topic}[{partition}]@{}",
                                record.offset
                            )));
                        }
                    },
                    Err(e) if e.is_retryable() => {
                        return Err(CoreError::transport(e.to_string()));
                    }
                    Err(e) => {
                        self.handler.record_decode_skip(None, origin, &e.to_string()).await?;
                        report.skipped += 1;
                    }
                }
                position = record.offset + 1;
            }
            self.transport
                .commit(&self.config.group_id, &tp, position)
                .await
                .map_err(to_core)?;
        }
        Ok(report)
    }

    fn is_paused(&self, tp: &TopicPartition) -> bool {
        self.controls.lock().get(tp).map(|c| c.paused).unwrap_or(false)
    }

    fn set_paused(&self, tp: &TopicPartition, paused: bool) {
        if let Some(control) = self.controls.lock().get_mut(tp) {
            control.paused = paused;
        }
    }

    /// Returns `true` when cancelled during the sleep.
    async fn sleep_or_cancel(&self, cancel: &CancellationToken, ms: u64) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
            _ = cancel.cancelled() => true,
        }
    }
}

enum Settled {
    Advanced,
    Cancelled,
    Halted(String),
}

/// Running consumer: per-partition tasks plus their controls.
pub struct ConsumerHandle {
    cancel: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    assigned: Vec<TopicPartition>,
    controls: Arc<Mutex<HashMap<TopicPartition, PartitionControl>>>,
}

impl std::fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHandle").finish_non_exhaustive()
    }
}

impl ConsumerHandle {
    pub fn assignment(&self) -> &[TopicPartition] {
        &self.assigned
    }

    /// Backpressure hook: stop polling the given partitions.
    pub fn pause(&self, partitions: &[TopicPartition]) {
        let mut controls = self.controls.lock();
        for tp in partitions {
            if let Some(control) = controls.get_mut(tp) {
                control.paused = true;
            }
        }
    }

    pub fn resume(&self, partitions: &[TopicPartition]) {
        let mut controls = self.controls.lock();
        for tp in partitions {
            if let Some(control) = controls.get_mut(tp) {
                control.paused = false;
            }
        }
    }

    /// Drain in-flight records, commit durable offsets, release partitions.
    pub async fn stop(self) {
        self.cancel.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("consumer stopped");
    }
}

/// [`IngestControl`] adapter handed to the `crm_ingest_offset` handler and
/// the admin surface.
pub struct ReplayControl<T, R, C: Clock> {
    consumer: Arc<StreamConsumer<T, R, C>>,
}

impl<T, R, C> ReplayControl<T, R, C>
where
    T: LogTransport,
    R: SchemaRegistry,
    C: Clock,
{
    pub fn new(consumer: Arc<StreamConsumer<T, R, C>>) -> Self {
        Self { consumer }
    }
}

#[async_trait::async_trait]
impl<T, R, C> IngestControl for ReplayControl<T, R, C>
where
    T: LogTransport,
    R: SchemaRegistry,
    C: Clock,
{
    async fn replay(
        &self,
        topic: &str,
        partition: i32,
        offset: i64,
    ) -> Result<ReplayReport, CoreError> {
        self.consumer.replay(topic, partition, offset).await
    }
}

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;
