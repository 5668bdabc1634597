// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Queue engine: claim → lease → run → settle.
//!
//! Each named queue gets an independent pool of workers. A worker claims the
//! best ready job, leases it for the queue's visibility timeout, runs the
//! registered handler under that deadline, and settles the outcome. Failed
//! settles are safe: the lease simply expires and the janitor re-offers the
//! job, which is why handlers must be idempotent.

use crate::error::{EngineError, HandlerError};
use crate::registry::{HandlerRegistry, JobContext, LeaseExtender};
use sift_core::{BackoffPolicy, Clock, EnqueueOptions, Job, JobId, Metrics};
use sift_storage::{QueueStats, SettleOutcome, Store};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Per-queue execution settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub visibility_timeout_ms: u64,
    pub default_max_attempts: u32,
    pub default_backoff: BackoffPolicy,
    /// Idle sleep between claim attempts.
    pub poll_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            visibility_timeout_ms: 30_000,
            default_max_attempts: 3,
            default_backoff: BackoffPolicy::default(),
            poll_interval_ms: 50,
        }
    }
}

/// Emitted when a job exhausts its retry budget.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub job_id: JobId,
    pub queue: String,
    pub kind: String,
    pub error: String,
    pub attempts: u32,
}

/// The queue engine. Shared behind an `Arc` by workers, the scheduler, and
/// the admin surface.
pub struct QueueEngine<C: Clock> {
    store: Arc<Store>,
    clock: C,
    metrics: Arc<Metrics>,
    registry: HandlerRegistry,
    queues: HashMap<String, QueueConfig>,
    dead_letters: broadcast::Sender<DeadLetter>,
}

impl<C: Clock> QueueEngine<C> {
    pub fn new(
        store: Arc<Store>,
        clock: C,
        metrics: Arc<Metrics>,
        registry: HandlerRegistry,
        queues: HashMap<String, QueueConfig>,
    ) -> Self {
        let (dead_letters, _) = broadcast::channel(64);
        Self { store, clock, metrics, registry, queues, dead_letters }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Subscribe to dead-letter events.
    pub fn dead_letters(&self) -> broadcast::Receiver<DeadLetter> {
        self.dead_letters.subscribe()
    }

    pub(crate) fn dead_letter_sender(&self) -> broadcast::Sender<DeadLetter> {
        self.dead_letters.clone()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn queue_config(&self, queue: &str) -> Result<&QueueConfig, EngineError> {
        self.queues.get(queue).ok_or_else(|| EngineError::UnknownQueue(queue.to_string()))
    }

    /// Enqueue options seeded from the queue's defaults.
    pub fn default_options(&self, queue: &str) -> Result<EnqueueOptions, EngineError> {
        let config = self.queue_config(queue)?;
        Ok(EnqueueOptions::default()
            .max_attempts(config.default_max_attempts)
            .backoff(config.default_backoff))
    }

    /// Enqueue a job. Suppressed (returning the existing id) when the
    /// deduplication key matches a live job in the queue.
    pub fn enqueue(
        &self,
        queue: &str,
        job_kind: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
    ) -> Result<JobId, EngineError> {
        self.queue_config(queue)?;
        let now = self.clock.epoch_ms();
        let (job_id, fresh) = self.store.enqueue_job(queue, job_kind, payload, opts, now)?;
        if fresh {
            self.metrics.incr_jobs_enqueued();
            debug!(job = %job_id, queue, kind = job_kind, "enqueued");
        } else {
            debug!(job = %job_id, queue, kind = job_kind, "enqueue deduplicated");
        }
        Ok(job_id)
    }

    /// Cancel a job (waiting/delayed drop immediately; active results are
    /// discarded at settle).
    pub fn cancel(&self, job_id: &JobId) -> Result<bool, EngineError> {
        Ok(self.store.cancel_job(job_id)?)
    }

    pub fn stats(&self, queue: &str) -> Result<QueueStats, EngineError> {
        self.queue_config(queue)?;
        Ok(self.store.queue_stats(queue))
    }

    /// Claim and run at most one job from `queue`. Returns whether a job was
    /// claimed. This is the worker loop body, exposed for deterministic tests.
    pub async fn step(&self, queue: &str, worker: &str) -> Result<bool, EngineError> {
        let config = self.queue_config(queue)?.clone();
        let now = self.clock.epoch_ms();
        let job = match self.store.claim_next(queue, worker, now, config.visibility_timeout_ms)? {
            Some(job) => job,
            None => return Ok(false),
        };
        self.run_claimed(job, &config, worker).await;
        Ok(true)
    }

    async fn run_claimed(&self, job: Job, config: &QueueConfig, worker: &str) {
        let attempt = job.attempts + 1;
        let deadline_ms = job.lease_until_ms.unwrap_or_else(|| {
            self.clock.epoch_ms() + config.visibility_timeout_ms
        });
        let lease = {
            let store = Arc::clone(&self.store);
            let clock = self.clock.clone();
            let job_id = job.id.clone();
            let visibility_timeout_ms = config.visibility_timeout_ms;
            LeaseExtender::new(Arc::new(move || {
                let now = clock.epoch_ms();
                store
                    .extend_lease(&job_id, now, visibility_timeout_ms)
                    .map(|()| now + visibility_timeout_ms)
                    .map_err(|e| e.to_string())
            }))
        };
        let ctx = JobContext {
            job_id: job.id.clone(),
            queue: job.queue.clone(),
            attempt,
            tenant_id: job.tenant_id.clone(),
            correlation_id: job.correlation_id.clone(),
            deadline_ms,
            cancellation: CancellationToken::new(),
            lease,
        };

        debug!(job = %job.id, queue = %job.queue, kind = %job.kind, attempt, worker, "running");

        let handler = match self.registry.get(&job.queue, &job.kind) {
            Some(handler) => handler,
            None => {
                let message = format!("no handler registered for job kind '{}'", job.kind);
                self.settle_failed(&job, &HandlerError::Permanent(message)).await;
                return;
            }
        };

        let budget = Duration::from_millis(config.visibility_timeout_ms);
        let cancellation = ctx.cancellation.clone();
        let run = handler.run(job.payload.clone(), ctx);
        let outcome = tokio::select! {
            result = tokio::time::timeout(budget, run) => result,
            _ = cancellation.cancelled() => Ok(Err(HandlerError::Transient("cancelled".into()))),
        };

        match outcome {
            Ok(Ok(result)) => match self.store.settle_success(&job.id, result) {
                Ok(true) => {
                    self.metrics.incr_jobs_completed();
                    debug!(job = %job.id, queue = %job.queue, "completed");
                }
                Ok(false) => {
                    debug!(job = %job.id, "result discarded (no longer active)");
                }
                Err(e) => {
                    // Leave the lease to expire; the janitor re-offers the job.
                    warn!(job = %job.id, error = %e, "settle failed, lease will lapse");
                }
            },
            Ok(Err(handler_error)) => self.settle_failed(&job, &handler_error).await,
            Err(_elapsed) => {
                // Deadline exceeded: the handler future was dropped at its
                // suspension point. The lease stands until the janitor
                // reclaims it, matching a crashed worker.
                warn!(job = %job.id, queue = %job.queue, "handler exceeded deadline");
            }
        }
    }

    async fn settle_failed(&self, job: &Job, handler_error: &HandlerError) {
        let permanent = handler_error.is_permanent();
        let now = self.clock.epoch_ms();
        match self.store.settle_failure(&job.id, handler_error.message(), permanent, now) {
            Ok(Some(SettleOutcome::Retried { attempt, next_available_at_ms })) => {
                self.metrics.incr_jobs_retried();
                info!(
                    job = %job.id,
                    queue = %job.queue,
                    attempt,
                    retry_in_ms = next_available_at_ms.saturating_sub(now),
                    error = handler_error.message(),
                    "attempt failed, will retry"
                );
            }
            Ok(Some(SettleOutcome::Dead { attempt })) => {
                self.metrics.incr_jobs_dead();
                error!(
                    job = %job.id,
                    queue = %job.queue,
                    attempt,
                    error = handler_error.message(),
                    "job dead-lettered"
                );
                let _ = self.dead_letters.send(DeadLetter {
                    job_id: job.id.clone(),
                    queue: job.queue.clone(),
                    kind: job.kind.clone(),
                    error: handler_error.message().to_string(),
                    attempts: attempt,
                });
            }
            Ok(None) => {
                debug!(job = %job.id, "failure settle ignored (no longer active)");
            }
            Err(e) => {
                warn!(job = %job.id, error = %e, "settle failed, lease will lapse");
            }
        }
    }
}

/// Spawned worker tasks for every configured queue.
pub struct WorkerPool {
    tasks: Vec<tokio::task::JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Spawn `concurrency` workers per queue. Workers stop claiming once
    /// `shutdown` fires and exit after their current job settles.
    pub fn spawn<C: Clock>(engine: Arc<QueueEngine<C>>, shutdown: CancellationToken) -> Self {
        let mut tasks = Vec::new();
        for (queue, config) in engine.queues.clone() {
            for index in 0..config.concurrency {
                let engine = Arc::clone(&engine);
                let queue = queue.clone();
                let shutdown = shutdown.clone();
                let poll_interval = Duration::from_millis(config.poll_interval_ms);
                tasks.push(tokio::spawn(async move {
                    let worker = format!("{queue}-{index}");
                    loop {
                        if shutdown.is_cancelled() {
                            break;
                        }
                        match engine.step(&queue, &worker).await {
                            Ok(true) => {}
                            Ok(false) => {
                                tokio::select! {
                                    _ = tokio::time::sleep(poll_interval) => {}
                                    _ = shutdown.cancelled() => break,
                                }
                            }
                            Err(e) => {
                                warn!(%queue, %worker, error = %e, "worker step failed");
                                tokio::select! {
                                    _ = tokio::time::sleep(poll_interval) => {}
                                    _ = shutdown.cancelled() => break,
                                }
                            }
                        }
                    }
                    debug!(%queue, %worker, "worker drained");
                }));
            }
        }
        Self { tasks, shutdown }
    }

    /// Stop claiming and wait for in-flight jobs to settle.
    pub async fn drain(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
