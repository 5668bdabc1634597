// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Staging table and event-log apply handlers.

use super::types::StagingRow;
use super::StoreState;
use crate::event::StoreEvent;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One range partition of a staging table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Partition {
    pub rows: Vec<StagingRow>,
}

/// A kind-specific staging table, range-partitioned on event timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagingTable {
    /// Partitions keyed by day bucket, in creation order.
    pub partitions: IndexMap<u32, Partition>,
    /// Unique index on event id.
    pub event_ids: HashSet<String>,
    /// Keys below this were dropped by retention; inserts into them fail
    /// with `partition_missing`.
    pub retention_floor: u32,
}

impl StagingTable {
    pub fn contains(&self, event_id: &str) -> bool {
        self.event_ids.contains(event_id)
    }

    pub fn row(&self, event_id: &str) -> Option<&StagingRow> {
        if !self.contains(event_id) {
            return None;
        }
        self.partitions.values().flat_map(|p| p.rows.iter()).find(|r| r.event_id == event_id)
    }

    pub fn row_count(&self) -> usize {
        self.partitions.values().map(|p| p.rows.len()).sum()
    }

    /// Whether the partition for this key can still accept rows.
    pub fn partition_exists(&self, key: u32) -> bool {
        key >= self.retention_floor
    }
}

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::StagingInserted { kind, row } => {
            let table = state.staging.entry(*kind).or_default();
            // Idempotency: replay of an already-applied insert is a no-op.
            if table.event_ids.insert(row.event_id.clone()) {
                table.partitions.entry(row.partition_key()).or_default().rows.push(row.clone());
            }
        }

        StoreEvent::EventLogged { entry } => {
            // The log is append-only; replay dedup is by exact position:
            // an identical trailing entry means the append already happened.
            if state.event_log.last() == Some(entry) {
                return;
            }
            let index = state.event_log.len();
            state.event_log_index.entry(entry.event_id.clone()).or_default().push(index);
            state.event_log.push(entry.clone());
        }

        StoreEvent::PartitionDropped { kind, partition_key } => {
            if let Some(table) = state.staging.get_mut(kind) {
                if let Some(partition) = table.partitions.shift_remove(partition_key) {
                    for row in &partition.rows {
                        table.event_ids.remove(&row.event_id);
                    }
                }
                if table.retention_floor <= *partition_key {
                    table.retention_floor = partition_key + 1;
                }
            }
        }

        _ => {}
    }
}
