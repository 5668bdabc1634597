// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Materialized store state: the in-memory tables replayed from the WAL.

mod jobs;
mod records;
mod schedules;
mod staging;
mod types;

pub use staging::{Partition, StagingTable};
pub use types::{
    partition_key, Artifact, ColumnProfile, Dataset, LineageEdge, Notification, QueueStats,
    RefreshRecord, Schedule, StagingRow, PARTITION_SPAN_MS,
};

use crate::event::{EventLogEntry, StoreEvent};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sift_core::envelope::StagingKind;
use sift_core::job::{Job, JobId};
use sift_core::ScheduleId;
use std::collections::HashMap;

/// All materialized tables. Serializable as a whole for snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreState {
    /// One staging table per CRM entity kind.
    pub staging: HashMap<StagingKind, StagingTable>,
    /// Append-only event log, indexed by event id.
    pub event_log: Vec<EventLogEntry>,
    #[serde(skip)]
    pub(crate) event_log_index: HashMap<String, Vec<usize>>,
    /// Jobs by id, in insertion order.
    pub jobs: IndexMap<JobId, Job>,
    /// Live dedup index: `(queue, dedup_key)` → non-terminal job.
    #[serde(skip)]
    pub(crate) dedup_index: HashMap<(String, String), JobId>,
    /// Monotonic sequence for job insertion order.
    pub next_job_seq: u64,
    pub schedules: IndexMap<ScheduleId, Schedule>,
    pub refresh_records: HashMap<String, RefreshRecord>,
    pub datasets: IndexMap<String, Dataset>,
    /// Column profiles keyed by `"{dataset_id}::{column_name}"`.
    pub column_profiles: IndexMap<String, ColumnProfile>,
    pub lineage: Vec<LineageEdge>,
    pub notifications: Vec<Notification>,
    pub artifacts: IndexMap<String, Artifact>,
}

impl StoreState {
    /// Apply one store event. Must stay idempotent: WAL replay after a crash
    /// can deliver an event that was already applied before the snapshot.
    pub fn apply(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::StagingInserted { .. }
            | StoreEvent::EventLogged { .. }
            | StoreEvent::PartitionDropped { .. } => staging::apply(self, event),

            StoreEvent::JobEnqueued { .. }
            | StoreEvent::JobClaimed { .. }
            | StoreEvent::JobLeaseExtended { .. }
            | StoreEvent::JobCompleted { .. }
            | StoreEvent::JobRetried { .. }
            | StoreEvent::JobDead { .. }
            | StoreEvent::JobCancelled { .. }
            | StoreEvent::JobLeaseRecovered { .. } => jobs::apply(self, event),

            StoreEvent::ScheduleUpserted { .. }
            | StoreEvent::ScheduleFired { .. }
            | StoreEvent::ScheduleEnabledSet { .. }
            | StoreEvent::ScheduleDeleted { .. } => schedules::apply(self, event),

            StoreEvent::RefreshRecorded { .. }
            | StoreEvent::DatasetUpserted { .. }
            | StoreEvent::ColumnProfileRecorded { .. }
            | StoreEvent::LineageRecorded { .. }
            | StoreEvent::NotificationRecorded { .. }
            | StoreEvent::ArtifactRecorded { .. } => records::apply(self, event),
        }
    }

    /// Rebuild the transient indexes after deserializing a snapshot.
    pub fn rebuild_indexes(&mut self) {
        self.event_log_index.clear();
        for (i, entry) in self.event_log.iter().enumerate() {
            self.event_log_index.entry(entry.event_id.clone()).or_default().push(i);
        }
        self.dedup_index.clear();
        for (id, job) in &self.jobs {
            if let Some(key) = &job.deduplication_key {
                if !job.is_terminal() {
                    self.dedup_index.insert((job.queue.clone(), key.clone()), id.clone());
                }
            }
        }
    }

    /// Log entries recorded for an event id, in arrival order.
    pub fn log_entries(&self, event_id: &str) -> Vec<&EventLogEntry> {
        self.event_log_index
            .get(event_id)
            .map(|indexes| indexes.iter().map(|&i| &self.event_log[i]).collect())
            .unwrap_or_default()
    }

    /// Whether a staging row exists for the event id, in any kind's table.
    pub fn staging_row(&self, event_id: &str) -> Option<&StagingRow> {
        self.staging.values().find_map(|table| table.row(event_id))
    }

    pub fn queue_stats(&self, queue: &str) -> QueueStats {
        let mut stats = QueueStats::default();
        for job in self.jobs.values().filter(|j| j.queue == queue) {
            use sift_core::job::JobState;
            match job.state {
                JobState::Waiting => stats.waiting += 1,
                JobState::Delayed => stats.delayed += 1,
                JobState::Active => stats.active += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
                JobState::Dead => stats.dead += 1,
                JobState::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

#[cfg(test)]
#[path = "../state_tests/mod.rs"]
mod tests;
