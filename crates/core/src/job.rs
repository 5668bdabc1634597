// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Job record and state machine.

use crate::backoff::BackoffPolicy;
use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a job instance.
    pub struct JobId("job-");
}

/// Job lifecycle states.
///
/// Transitions are monotonic except for the retry loop
/// (`Active → Waiting` on failure) until `max_attempts` is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Ready to be claimed once `available_at` passes.
    Waiting,
    /// Enqueued with a delay that has not elapsed.
    Delayed,
    /// Claimed by a worker holding a live lease.
    Active,
    /// Finished successfully; `result` is set.
    Completed,
    /// Last attempt failed; superseded by Waiting on retry.
    Failed,
    /// Retry budget exhausted; retained for inspection, never retried.
    Dead,
    /// Cancelled before execution, or result discarded after it.
    Cancelled,
}

impl JobState {
    /// Terminal states never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead | JobState::Cancelled)
    }
}

crate::label_enum! {
    JobState {
        Waiting => "waiting",
        Delayed => "delayed",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
        Dead => "dead",
        Cancelled => "cancelled",
    }
}

/// Options accepted at enqueue time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueOptions {
    /// Higher runs earlier.
    pub priority: i32,
    pub delay_ms: u64,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            delay_ms: 0,
            max_attempts: 3,
            backoff: BackoffPolicy::default(),
            deduplication_key: None,
            tenant_id: None,
            correlation_id: None,
        }
    }
}

impl EnqueueOptions {
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn deduplication_key(mut self, key: impl Into<String>) -> Self {
        self.deduplication_key = Some(key.into());
        self
    }

    pub fn tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant_id = Some(tenant.into());
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// A persistent job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub queue: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: i32,
    /// Earliest claimable time (epoch ms).
    pub available_at_ms: u64,
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
    pub state: JobState,
    /// Set while `Active`; expiry returns the job to `Waiting`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_until_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deduplication_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub enqueued_at_ms: u64,
    /// Insertion order within the store; claim tie-breaker.
    pub seq: u64,
}

impl Job {
    /// Build a job from enqueue parameters. `seq` is assigned by the store.
    pub fn from_enqueue(
        id: JobId,
        queue: impl Into<String>,
        kind: impl Into<String>,
        payload: serde_json::Value,
        opts: EnqueueOptions,
        now_ms: u64,
    ) -> Self {
        let state = if opts.delay_ms > 0 { JobState::Delayed } else { JobState::Waiting };
        Self {
            id,
            queue: queue.into(),
            kind: kind.into(),
            payload,
            priority: opts.priority,
            available_at_ms: now_ms + opts.delay_ms,
            attempts: 0,
            max_attempts: opts.max_attempts.max(1),
            backoff: opts.backoff,
            state,
            lease_until_ms: None,
            last_error: None,
            result: None,
            deduplication_key: opts.deduplication_key,
            tenant_id: opts.tenant_id,
            correlation_id: opts.correlation_id,
            enqueued_at_ms: now_ms,
            seq: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Whether a worker may claim this job at `now_ms`.
    pub fn is_ready(&self, now_ms: u64) -> bool {
        matches!(self.state, JobState::Waiting | JobState::Delayed)
            && self.available_at_ms <= now_ms
    }

    /// Whether this job's lease has lapsed.
    pub fn lease_expired(&self, now_ms: u64) -> bool {
        self.state == JobState::Active
            && self.lease_until_ms.map(|until| until <= now_ms).unwrap_or(true)
    }

    /// Whether one more failure moves this job to `Dead`.
    pub fn on_last_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[cfg(any(test, feature = "test-support"))]
pub struct JobBuilder {
    job: Job,
}

#[cfg(any(test, feature = "test-support"))]
impl JobBuilder {
    pub fn new(queue: &str, kind: &str) -> Self {
        Self {
            job: Job::from_enqueue(
                JobId::new(),
                queue,
                kind,
                serde_json::Value::Null,
                EnqueueOptions::default(),
                0,
            ),
        }
    }

    pub fn state(mut self, state: JobState) -> Self {
        self.job.state = state;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.job.priority = priority;
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.job.attempts = attempts;
        self
    }

    pub fn build(self) -> Job {
        self.job
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
