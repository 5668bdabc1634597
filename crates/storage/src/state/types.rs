// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Row types for the materialized tables.

use serde::{Deserialize, Serialize};
use sift_core::cron::CronExpr;
use sift_core::envelope::EventKind;
use sift_core::ScheduleId;

/// Milliseconds per staging partition (one day).
pub const PARTITION_SPAN_MS: u64 = 24 * 60 * 60 * 1000;

/// Partition key covering the given event timestamp (days since epoch).
pub fn partition_key(event_timestamp_ms: u64) -> u32 {
    (event_timestamp_ms / PARTITION_SPAN_MS) as u32
}

/// A staged CRM event row. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagingRow {
    pub event_id: String,
    pub tenant_id: String,
    pub event_timestamp_ms: u64,
    pub event_type: EventKind,
    pub processed_at_ms: u64,
    pub payload_json: serde_json::Value,
}

impl StagingRow {
    /// The range partition this row lands in.
    pub fn partition_key(&self) -> u32 {
        partition_key(self.event_timestamp_ms)
    }
}

/// A cron-driven recurring job submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub cron: CronExpr,
    pub queue: String,
    pub job_kind: String,
    pub payload: serde_json::Value,
    pub tenant_id: Option<String>,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fired_at_ms: Option<u64>,
    pub next_fire_at_ms: u64,
}

/// Per-view refresh bookkeeping, updated exclusively by the refresh handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshRecord {
    pub view_name: String,
    pub last_refreshed_at_ms: u64,
    pub last_success_duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Bumped on every successful refresh; folded into dependent cache
    /// fingerprints so stale entries miss naturally.
    #[serde(default)]
    pub version: u64,
}

/// A discovered dataset in a connected source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: String,
    pub connector_id: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
    pub discovered_at_ms: u64,
}

/// Column statistics from a profiling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnProfile {
    pub dataset_id: String,
    pub column_name: String,
    pub data_type: String,
    pub null_fraction: f64,
    pub distinct_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii_kind: Option<String>,
    pub profiled_at_ms: u64,
}

impl ColumnProfile {
    /// Upsert key within the profiles table.
    pub fn key(&self) -> String {
        format!("{}::{}", self.dataset_id, self.column_name)
    }
}

/// A lineage edge between identifier-keyed catalog records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub source_id: String,
    pub target_id: String,
    pub kind: String,
}

/// One dispatch attempt of an alert to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub alert_id: String,
    pub channel: String,
    pub delivered: bool,
    pub dispatched_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// A rendered export or report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub location: String,
    pub signed_url: String,
    pub url_expires_at_ms: u64,
    pub sha256: String,
    pub created_at_ms: u64,
}

/// Per-queue state counts for the admin surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub delayed: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead: usize,
    pub cancelled: usize,
}
