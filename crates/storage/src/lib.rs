// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sift-storage: persistent store for staging, event log, jobs, schedules,
//! and derived records.
//!
//! Every mutation is expressed as a [`StoreEvent`] batch. A batch is written
//! to the write-ahead log as a single entry and then applied to the
//! materialized tables under one lock, which makes the batch the store's
//! transaction unit: either every event in it is durable and visible, or
//! none is. The ingestion idempotency invariant and the scheduler's
//! fire-and-advance pairing both rely on exactly this.

mod event;
mod snapshot;
mod state;
mod store;
mod wal;

pub use event::{EventLogEntry, EventOrigin, StoreEvent};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use state::{
    partition_key, Artifact, ColumnProfile, Dataset, LineageEdge, Notification, Partition,
    QueueStats, RefreshRecord, Schedule, StagingRow, StagingTable, StoreState, PARTITION_SPAN_MS,
};
pub use store::{RecoveredLease, SettleOutcome, Store, StoreError};
pub use wal::{Wal, WalEntry, WalError};
