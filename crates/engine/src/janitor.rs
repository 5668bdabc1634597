// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Lease recovery.
//!
//! A dedicated task scans for expired leases and returns them to waiting
//! (attempt-incremented) or dead-letters them when the budget is gone.
//! This is what makes a crashed worker indistinguishable from a failed
//! attempt.

use crate::queue::{DeadLetter, QueueEngine};
use sift_core::{Clock, Metrics};
use sift_storage::{Store, StoreError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct Janitor<C: Clock> {
    store: Arc<Store>,
    clock: C,
    metrics: Arc<Metrics>,
    dead_letters: broadcast::Sender<DeadLetter>,
    scan_interval: Duration,
}

impl<C: Clock> Janitor<C> {
    pub fn new(engine: &QueueEngine<C>, scan_interval: Duration) -> Self {
        Self {
            store: Arc::clone(engine.store()),
            clock: engine.clock().clone(),
            metrics: engine.metrics(),
            dead_letters: engine.dead_letter_sender(),
            scan_interval,
        }
    }

    /// One recovery pass. Returns the number of leases reclaimed.
    pub fn sweep(&self) -> Result<usize, StoreError> {
        let now = self.clock.epoch_ms();
        let recovered = self.store.recover_expired_leases(now)?;
        for lease in &recovered {
            if lease.dead {
                self.metrics.incr_jobs_dead();
                let job = self.store.job(&lease.job_id);
                info!(job = %lease.job_id, queue = %lease.queue, "expired lease dead-lettered");
                let _ = self.dead_letters.send(DeadLetter {
                    job_id: lease.job_id.clone(),
                    queue: lease.queue.clone(),
                    kind: job.as_ref().map(|j| j.kind.clone()).unwrap_or_default(),
                    error: "lease expired".to_string(),
                    attempts: job.map(|j| j.attempts).unwrap_or_default(),
                });
            } else {
                self.metrics.incr_jobs_retried();
                info!(job = %lease.job_id, queue = %lease.queue, "expired lease recovered");
            }
        }
        Ok(recovered.len())
    }

    /// Run periodic sweeps until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.scan_interval) => {}
                _ = shutdown.cancelled() => break,
            }
            if let Err(e) = self.sweep() {
                warn!(error = %e, "lease recovery sweep failed");
            }
        }
    }
}

#[cfg(test)]
#[path = "janitor_tests.rs"]
mod tests;
