// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Store events: the WAL vocabulary.
//!
//! Applying a store event to [`StoreState`](crate::StoreState) must be
//! idempotent, because a crash between WAL append and snapshot can replay
//! entries that were already applied.

use crate::state::{
    Artifact, ColumnProfile, Dataset, LineageEdge, Notification, RefreshRecord, Schedule,
    StagingRow,
};
use serde::{Deserialize, Serialize};
use sift_core::envelope::StagingKind;
use sift_core::job::{Job, JobId};
use sift_core::outcome::ProcessingStatus;
use sift_core::ScheduleId;

/// Where an event came from on the partitioned log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventOrigin {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

impl EventOrigin {
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self { topic: topic.into(), partition, offset }
    }
}

/// One row of the append-only event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub event_id: String,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub tenant_id: Option<String>,
    pub status: ProcessingStatus,
    pub processed_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
}

/// Events applied to the materialized tables. One WAL entry holds a batch
/// of these; the batch is the transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    // === Ingestion ===
    StagingInserted { kind: StagingKind, row: StagingRow },
    EventLogged { entry: EventLogEntry },
    PartitionDropped { kind: StagingKind, partition_key: u32 },

    // === Jobs ===
    JobEnqueued { job: Job },
    JobClaimed { job_id: JobId, lease_until_ms: u64, worker: String },
    JobLeaseExtended { job_id: JobId, lease_until_ms: u64 },
    JobCompleted { job_id: JobId, result: serde_json::Value },
    /// Attempt failed with retry budget left; attempts incremented.
    JobRetried { job_id: JobId, error: String, next_available_at_ms: u64 },
    /// Retry budget exhausted (or permanent error); attempts incremented.
    JobDead { job_id: JobId, error: String },
    JobCancelled { job_id: JobId },
    /// Janitor reclaimed an expired lease; attempts incremented.
    JobLeaseRecovered { job_id: JobId },

    // === Schedules ===
    ScheduleUpserted { schedule: Schedule },
    ScheduleFired { schedule_id: ScheduleId, fired_at_ms: u64, next_fire_at_ms: u64 },
    ScheduleEnabledSet { schedule_id: ScheduleId, enabled: bool },
    ScheduleDeleted { schedule_id: ScheduleId },

    // === Derived records ===
    RefreshRecorded { record: RefreshRecord },
    DatasetUpserted { dataset: Dataset },
    ColumnProfileRecorded { profile: ColumnProfile },
    LineageRecorded { edge: LineageEdge },
    NotificationRecorded { notification: Notification },
    ArtifactRecorded { artifact: Artifact },
}

impl StoreEvent {
    /// Event name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            StoreEvent::StagingInserted { .. } => "staging_inserted",
            StoreEvent::EventLogged { .. } => "event_logged",
            StoreEvent::PartitionDropped { .. } => "partition_dropped",
            StoreEvent::JobEnqueued { .. } => "job_enqueued",
            StoreEvent::JobClaimed { .. } => "job_claimed",
            StoreEvent::JobLeaseExtended { .. } => "job_lease_extended",
            StoreEvent::JobCompleted { .. } => "job_completed",
            StoreEvent::JobRetried { .. } => "job_retried",
            StoreEvent::JobDead { .. } => "job_dead",
            StoreEvent::JobCancelled { .. } => "job_cancelled",
            StoreEvent::JobLeaseRecovered { .. } => "job_lease_recovered",
            StoreEvent::ScheduleUpserted { .. } => "schedule_upserted",
            StoreEvent::ScheduleFired { .. } => "schedule_fired",
            StoreEvent::ScheduleEnabledSet { .. } => "schedule_enabled_set",
            StoreEvent::ScheduleDeleted { .. } => "schedule_deleted",
            StoreEvent::RefreshRecorded { .. } => "refresh_recorded",
            StoreEvent::DatasetUpserted { .. } => "dataset_upserted",
            StoreEvent::ColumnProfileRecorded { .. } => "column_profile_recorded",
            StoreEvent::LineageRecorded { .. } => "lineage_recorded",
            StoreEvent::NotificationRecorded { .. } => "notification_recorded",
            StoreEvent::ArtifactRecorded { .. } => "artifact_recorded",
        }
    }
}
