// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use sift_core::envelope::StagingKind;
use sift_core::outcome::ProcessingStatus;

const DAY_MS: u64 = PARTITION_SPAN_MS;

#[test]
fn insert_creates_partition_and_index() {
    let mut state = StoreState::default();
    state.apply(&StoreEvent::StagingInserted {
        kind: StagingKind::Lead,
        row: staging_row("a", 5 * DAY_MS + 100),
    });

    let table = &state.staging[&StagingKind::Lead];
    assert!(table.contains("a"));
    assert_eq!(table.row_count(), 1);
    assert!(table.partitions.contains_key(&5));
    assert_eq!(state.staging_row("a").unwrap().event_id, "a");
}

#[test]
fn replayed_insert_is_idempotent() {
    let mut state = StoreState::default();
    let event = StoreEvent::StagingInserted {
        kind: StagingKind::Lead,
        row: staging_row("a", DAY_MS),
    };
    state.apply(&event);
    state.apply(&event);

    assert_eq!(state.staging[&StagingKind::Lead].row_count(), 1);
}

#[test]
fn rows_partition_by_event_timestamp() {
    let mut state = StoreState::default();
    for (id, ts) in [("a", DAY_MS), ("b", DAY_MS + 50), ("c", 3 * DAY_MS)] {
        state.apply(&StoreEvent::StagingInserted {
            kind: StagingKind::Lead,
            row: staging_row(id, ts),
        });
    }

    let table = &state.staging[&StagingKind::Lead];
    assert_eq!(table.partitions[&1].rows.len(), 2);
    assert_eq!(table.partitions[&3].rows.len(), 1);
}

#[test]
fn partition_drop_removes_rows_and_raises_floor() {
    let mut state = StoreState::default();
    state.apply(&StoreEvent::StagingInserted {
        kind: StagingKind::Lead,
        row: staging_row("a", DAY_MS),
    });
    state.apply(&StoreEvent::StagingInserted {
        kind: StagingKind::Lead,
        row: staging_row("b", 2 * DAY_MS),
    });

    state.apply(&StoreEvent::PartitionDropped { kind: StagingKind::Lead, partition_key: 1 });

    let table = &state.staging[&StagingKind::Lead];
    assert!(!table.contains("a"));
    assert!(table.contains("b"));
    assert!(!table.partition_exists(0));
    assert!(!table.partition_exists(1));
    assert!(table.partition_exists(2));
}

#[test]
fn log_entries_accumulate_per_event_id() {
    let mut state = StoreState::default();
    state.apply(&StoreEvent::EventLogged { entry: log_entry("a", ProcessingStatus::Processed) });
    state.apply(&StoreEvent::EventLogged { entry: log_entry("a", ProcessingStatus::Skipped) });
    state.apply(&StoreEvent::EventLogged { entry: log_entry("b", ProcessingStatus::Failed) });

    let entries = state.log_entries("a");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].status, ProcessingStatus::Processed);
    assert_eq!(entries[1].status, ProcessingStatus::Skipped);
    assert_eq!(state.log_entries("b").len(), 1);
    assert!(state.log_entries("missing").is_empty());
}

#[test]
fn identical_trailing_log_replay_is_absorbed() {
    let mut state = StoreState::default();
    let event = StoreEvent::EventLogged { entry: log_entry("a", ProcessingStatus::Processed) };
    state.apply(&event);
    state.apply(&event);

    assert_eq!(state.event_log.len(), 1);
}
