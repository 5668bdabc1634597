// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! The store facade: validate-then-commit operations over the tables.
//!
//! Every public mutation validates against the materialized state and then
//! commits a [`StoreEvent`] batch — one WAL append, then apply — all under a
//! single lock. That lock-plus-batch is the transaction: no caller ever
//! observes a staging row without its log entry, or a fired schedule whose
//! job was lost.

use crate::event::{EventLogEntry, StoreEvent};
use crate::snapshot::{Snapshot, SnapshotError};
use crate::state::{
    partition_key, Artifact, ColumnProfile, Dataset, LineageEdge, Notification, QueueStats,
    RefreshRecord, Schedule, StagingRow, StoreState,
};
use crate::wal::{Wal, WalError};
use parking_lot::Mutex;
use sift_core::envelope::StagingKind;
use sift_core::job::{EnqueueOptions, Job, JobId, JobState};
use sift_core::ScheduleId;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate event {0}")]
    DuplicateEvent(String),

    #[error("partition {partition_key} for {kind} staging was dropped by retention")]
    PartitionMissing { kind: StagingKind, partition_key: u32 },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("schedule {0} not found")]
    ScheduleNotFound(ScheduleId),

    #[error("wal error: {0}")]
    Wal(#[from] WalError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[cfg(any(test, feature = "test-support"))]
    #[error("injected commit failure")]
    Injected,
}

impl StoreError {
    /// Whether the failure is transient from the caller's point of view.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Wal(_) => true,
            #[cfg(any(test, feature = "test-support"))]
            StoreError::Injected => true,
            _ => false,
        }
    }
}

/// Outcome of settling a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleOutcome {
    /// Returned to waiting; claimable at `next_available_at_ms`.
    Retried { attempt: u32, next_available_at_ms: u64 },
    /// Retry budget exhausted or failure was permanent.
    Dead { attempt: u32 },
}

/// A lease the janitor reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredLease {
    pub job_id: JobId,
    pub queue: String,
    /// True when recovery exhausted the retry budget and the job went dead.
    pub dead: bool,
}

struct Inner {
    state: StoreState,
    wal: Option<Wal>,
    #[cfg(any(test, feature = "test-support"))]
    fail_commits: u32,
}

/// Durable store handle. Cheap to share behind an `Arc`.
pub struct Store {
    inner: Mutex<Inner>,
    dir: Option<PathBuf>,
}

impl Store {
    /// Open a store rooted at `dir`, loading the snapshot and replaying the
    /// WAL tail.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        let snapshot_path = dir.join("store.snapshot");
        let wal_path = dir.join("store.wal");

        let (mut state, covered_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (StoreState::default(), 0),
        };

        let (wal, replay) = Wal::open(&wal_path, covered_seq)?;
        let replayed = replay.len();
        for entry in replay {
            for event in &entry.events {
                state.apply(event);
            }
        }
        if replayed > 0 {
            tracing::info!(entries = replayed, "replayed wal tail");
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal: Some(wal),
                #[cfg(any(test, feature = "test-support"))]
                fail_commits: 0,
            }),
            dir: Some(dir.to_path_buf()),
        })
    }

    /// In-memory store without durability. Used by tests and by callers that
    /// manage persistence externally.
    pub fn in_memory() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: StoreState::default(),
                wal: None,
                #[cfg(any(test, feature = "test-support"))]
                fail_commits: 0,
            }),
            dir: None,
        }
    }

    /// Make the next `n` commits fail with a transient error.
    #[cfg(any(test, feature = "test-support"))]
    pub fn fail_next_commits(&self, n: u32) {
        self.inner.lock().fail_commits = n;
    }

    /// Write a snapshot covering everything applied so far and truncate the
    /// WAL. No-op for in-memory stores.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        let dir = match &self.dir {
            Some(dir) => dir.clone(),
            None => return Ok(()),
        };
        let mut inner = self.inner.lock();
        let seq = inner.wal.as_ref().map(|w| w.last_seq()).unwrap_or(0);
        Snapshot::save(&dir.join("store.snapshot"), seq, &inner.state)?;
        if let Some(wal) = inner.wal.as_mut() {
            wal.truncate()?;
        }
        Ok(())
    }

    /// Read-only access to the materialized state.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.inner.lock().state)
    }

    fn commit(inner: &mut Inner, events: Vec<StoreEvent>) -> Result<(), StoreError> {
        #[cfg(any(test, feature = "test-support"))]
        if inner.fail_commits > 0 {
            inner.fail_commits -= 1;
            return Err(StoreError::Injected);
        }
        if let Some(wal) = inner.wal.as_mut() {
            wal.append(&events)?;
        }
        for event in &events {
            inner.state.apply(event);
        }
        Ok(())
    }

    // === Ingestion ===

    /// Atomically insert a staging row and its `processed` log entry.
    ///
    /// Fails without side effects on duplicate event ids or dropped
    /// partitions; the caller records the corresponding log entry alone.
    pub fn accept_event(
        &self,
        kind: StagingKind,
        row: StagingRow,
        entry: EventLogEntry,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(table) = inner.state.staging.get(&kind) {
            if table.contains(&row.event_id) {
                return Err(StoreError::DuplicateEvent(row.event_id));
            }
            let key = row.partition_key();
            if !table.partition_exists(key) {
                return Err(StoreError::PartitionMissing { kind, partition_key: key });
            }
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::StagingInserted { kind, row }, StoreEvent::EventLogged { entry }],
        )
    }

    /// Append a stand-alone log entry (skipped or failed records).
    pub fn append_log(&self, entry: EventLogEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::EventLogged { entry }])
    }

    /// Drop staging partitions of `kind` entirely outside the retention
    /// window. Returns the dropped partition keys.
    pub fn enforce_retention(
        &self,
        kind: StagingKind,
        window_ms: u64,
        now_ms: u64,
    ) -> Result<Vec<u32>, StoreError> {
        let mut inner = self.inner.lock();
        let cutoff = partition_key(now_ms.saturating_sub(window_ms));
        let expired: Vec<u32> = inner
            .state
            .staging
            .get(&kind)
            .map(|table| {
                table.partitions.keys().copied().filter(|key| *key < cutoff).collect()
            })
            .unwrap_or_default();
        if expired.is_empty() {
            return Ok(expired);
        }
        let events = expired
            .iter()
            .map(|key| StoreEvent::PartitionDropped { kind, partition_key: *key })
            .collect();
        Self::commit(&mut inner, events)?;
        Ok(expired)
    }

    // === Jobs ===

    /// Enqueue a job. When a deduplication key matches a non-terminal job in
    /// the same queue, the enqueue is suppressed and the existing id is
    /// returned with `fresh = false`.
    pub fn enqueue_job(
        &self,
        queue: &str,
        kind: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
        now_ms: u64,
    ) -> Result<(JobId, bool), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(dedup_key) = &opts.deduplication_key {
            let index_key = (queue.to_string(), dedup_key.clone());
            if let Some(existing) = inner.state.dedup_index.get(&index_key) {
                return Ok((existing.clone(), false));
            }
        }
        let job = Job::from_enqueue(JobId::new(), queue, kind, payload, opts, now_ms);
        let id = job.id.clone();
        Self::commit(&mut inner, vec![StoreEvent::JobEnqueued { job }])?;
        Ok((id, true))
    }

    /// Claim the best ready job in `queue`: highest priority, then earliest
    /// available time, then insertion order. Marks it active with a lease.
    pub fn claim_next(
        &self,
        queue: &str,
        worker: &str,
        now_ms: u64,
        visibility_timeout_ms: u64,
    ) -> Result<Option<Job>, StoreError> {
        let mut inner = self.inner.lock();
        let best = inner
            .state
            .jobs
            .values()
            .filter(|job| job.queue == queue && job.is_ready(now_ms))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.available_at_ms.cmp(&a.available_at_ms))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|job| job.id.clone());

        let job_id = match best {
            Some(id) => id,
            None => return Ok(None),
        };
        let lease_until_ms = now_ms + visibility_timeout_ms;
        Self::commit(
            &mut inner,
            vec![StoreEvent::JobClaimed {
                job_id: job_id.clone(),
                lease_until_ms,
                worker: worker.to_string(),
            }],
        )?;
        Ok(inner.state.jobs.get(&job_id).cloned())
    }

    /// Extend the lease of an active job (long-running handlers).
    pub fn extend_lease(
        &self,
        job_id: &JobId,
        now_ms: u64,
        visibility_timeout_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.jobs.contains_key(job_id) {
            return Err(StoreError::JobNotFound(job_id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::JobLeaseExtended {
                job_id: job_id.clone(),
                lease_until_ms: now_ms + visibility_timeout_ms,
            }],
        )
    }

    /// Record a successful attempt. A no-op (returning `false`) when the job
    /// is no longer active — a cancelled job's result is discarded, and a
    /// lease that was already reclaimed must not double-settle.
    pub fn settle_success(
        &self,
        job_id: &JobId,
        result: serde_json::Value,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.state.jobs.get(job_id) {
            Some(job) if job.state == JobState::Active => {}
            Some(_) => return Ok(false),
            None => return Err(StoreError::JobNotFound(job_id.clone())),
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::JobCompleted { job_id: job_id.clone(), result }],
        )?;
        Ok(true)
    }

    /// Record a failed attempt. Computes the retry delay from the job's
    /// backoff policy, or moves the job to dead when the budget is exhausted
    /// or the failure is permanent.
    pub fn settle_failure(
        &self,
        job_id: &JobId,
        error: &str,
        permanent: bool,
        now_ms: u64,
    ) -> Result<Option<SettleOutcome>, StoreError> {
        let mut inner = self.inner.lock();
        let outcome = match inner.state.jobs.get(job_id) {
            Some(job) if job.state == JobState::Active => {
                let attempt = job.attempts + 1;
                if permanent || attempt >= job.max_attempts {
                    SettleOutcome::Dead { attempt }
                } else {
                    let delay = job.backoff.delay_ms(attempt, job.id.as_str());
                    SettleOutcome::Retried { attempt, next_available_at_ms: now_ms + delay }
                }
            }
            Some(_) => return Ok(None),
            None => return Err(StoreError::JobNotFound(job_id.clone())),
        };

        let event = match &outcome {
            SettleOutcome::Retried { next_available_at_ms, .. } => StoreEvent::JobRetried {
                job_id: job_id.clone(),
                error: error.to_string(),
                next_available_at_ms: *next_available_at_ms,
            },
            SettleOutcome::Dead { .. } => {
                StoreEvent::JobDead { job_id: job_id.clone(), error: error.to_string() }
            }
        };
        Self::commit(&mut inner, vec![event])?;
        Ok(Some(outcome))
    }

    /// Cancel a job. Waiting and delayed jobs transition immediately; active
    /// jobs keep running but their settle becomes a no-op. Terminal jobs are
    /// left untouched (returns `false`).
    pub fn cancel_job(&self, job_id: &JobId) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        match inner.state.jobs.get(job_id) {
            Some(job) if !job.is_terminal() => {}
            Some(_) => return Ok(false),
            None => return Err(StoreError::JobNotFound(job_id.clone())),
        }
        Self::commit(&mut inner, vec![StoreEvent::JobCancelled { job_id: job_id.clone() }])?;
        Ok(true)
    }

    /// Return expired leases to waiting (or dead when the budget is gone).
    pub fn recover_expired_leases(&self, now_ms: u64) -> Result<Vec<RecoveredLease>, StoreError> {
        let mut inner = self.inner.lock();
        let expired: Vec<(JobId, String, bool)> = inner
            .state
            .jobs
            .values()
            .filter(|job| job.lease_expired(now_ms))
            .map(|job| {
                (job.id.clone(), job.queue.clone(), job.attempts + 1 >= job.max_attempts)
            })
            .collect();

        let mut recovered = Vec::with_capacity(expired.len());
        for (job_id, queue, exhausted) in expired {
            let event = if exhausted {
                StoreEvent::JobDead {
                    job_id: job_id.clone(),
                    error: "lease expired".to_string(),
                }
            } else {
                StoreEvent::JobLeaseRecovered { job_id: job_id.clone() }
            };
            Self::commit(&mut inner, vec![event])?;
            recovered.push(RecoveredLease { job_id, queue, dead: exhausted });
        }
        Ok(recovered)
    }

    pub fn job(&self, job_id: &JobId) -> Option<Job> {
        self.read(|state| state.jobs.get(job_id).cloned())
    }

    pub fn queue_stats(&self, queue: &str) -> QueueStats {
        self.read(|state| state.queue_stats(queue))
    }

    // === Schedules ===

    pub fn upsert_schedule(&self, schedule: Schedule) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::ScheduleUpserted { schedule }])
    }

    /// Atomically enqueue the schedule's job and advance its fire time.
    /// The enqueue is suppressed by the job's deduplication key if the same
    /// fire was already recorded (crash between enqueue and advance).
    pub fn fire_schedule(
        &self,
        schedule_id: &ScheduleId,
        queue: &str,
        kind: &str,
        payload: serde_json::Value,
        opts: EnqueueOptions,
        fired_at_ms: u64,
        next_fire_at_ms: u64,
    ) -> Result<(JobId, bool), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.schedules.contains_key(schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id.clone()));
        }

        let mut events = Vec::with_capacity(2);
        let (job_id, fresh) = {
            let existing = opts.deduplication_key.as_ref().and_then(|key| {
                inner.state.dedup_index.get(&(queue.to_string(), key.clone())).cloned()
            });
            match existing {
                Some(id) => (id, false),
                None => {
                    let job =
                        Job::from_enqueue(JobId::new(), queue, kind, payload, opts, fired_at_ms);
                    let id = job.id.clone();
                    events.push(StoreEvent::JobEnqueued { job });
                    (id, true)
                }
            }
        };
        events.push(StoreEvent::ScheduleFired {
            schedule_id: schedule_id.clone(),
            fired_at_ms,
            next_fire_at_ms,
        });
        Self::commit(&mut inner, events)?;
        Ok((job_id, fresh))
    }

    /// Advance a schedule's fire time without enqueueing (stale fires
    /// outside the catch-up span).
    pub fn advance_schedule(
        &self,
        schedule_id: &ScheduleId,
        fired_at_ms: u64,
        next_fire_at_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.schedules.contains_key(schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::ScheduleFired {
                schedule_id: schedule_id.clone(),
                fired_at_ms,
                next_fire_at_ms,
            }],
        )
    }

    pub fn set_schedule_enabled(
        &self,
        schedule_id: &ScheduleId,
        enabled: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.schedules.contains_key(schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::ScheduleEnabledSet { schedule_id: schedule_id.clone(), enabled }],
        )
    }

    pub fn delete_schedule(&self, schedule_id: &ScheduleId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.schedules.contains_key(schedule_id) {
            return Err(StoreError::ScheduleNotFound(schedule_id.clone()));
        }
        Self::commit(
            &mut inner,
            vec![StoreEvent::ScheduleDeleted { schedule_id: schedule_id.clone() }],
        )
    }

    pub fn schedule(&self, schedule_id: &ScheduleId) -> Option<Schedule> {
        self.read(|state| state.schedules.get(schedule_id).cloned())
    }

    /// Schedules to consider for firing, sorted by next fire time.
    pub fn due_schedules(&self, now_ms: u64) -> Vec<Schedule> {
        self.read(|state| {
            let mut due: Vec<Schedule> = state
                .schedules
                .values()
                .filter(|s| s.enabled && s.next_fire_at_ms <= now_ms)
                .cloned()
                .collect();
            due.sort_by_key(|s| s.next_fire_at_ms);
            due
        })
    }

    pub fn list_schedules(&self, enabled: Option<bool>) -> Vec<Schedule> {
        self.read(|state| {
            state
                .schedules
                .values()
                .filter(|s| enabled.map(|e| s.enabled == e).unwrap_or(true))
                .cloned()
                .collect()
        })
    }

    // === Derived records ===

    pub fn record_refresh(&self, record: RefreshRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::RefreshRecorded { record }])
    }

    pub fn refresh_record(&self, view_name: &str) -> Option<RefreshRecord> {
        self.read(|state| state.refresh_records.get(view_name).cloned())
    }

    pub fn upsert_dataset(&self, dataset: Dataset) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::DatasetUpserted { dataset }])
    }

    pub fn record_column_profile(&self, profile: ColumnProfile) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::ColumnProfileRecorded { profile }])
    }

    pub fn record_lineage(&self, edge: LineageEdge) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::LineageRecorded { edge }])
    }

    pub fn record_notification(&self, notification: Notification) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::NotificationRecorded { notification }])
    }

    pub fn record_artifact(&self, artifact: Artifact) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, vec![StoreEvent::ArtifactRecorded { artifact }])
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
