// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use crate::event::StoreEvent;
use crate::state::RefreshRecord;

fn populated_state() -> StoreState {
    let mut state = StoreState::default();
    state.apply(&StoreEvent::RefreshRecorded {
        record: RefreshRecord {
            view_name: "v_pipeline".to_string(),
            last_refreshed_at_ms: 100,
            last_success_duration_ms: 25,
            last_error: None,
            version: 3,
        },
    });
    state
}

#[test]
fn missing_snapshot_loads_as_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Snapshot::load(&dir.path().join("store.snapshot")).unwrap().is_none());
}

#[test]
fn save_and_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.snapshot");
    Snapshot::save(&path, 42, &populated_state()).unwrap();

    let snapshot = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(snapshot.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(snapshot.seq, 42);
    assert_eq!(snapshot.state.refresh_records["v_pipeline"].version, 3);
}

#[test]
fn newer_version_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.snapshot");

    let snapshot = Snapshot {
        version: CURRENT_SNAPSHOT_VERSION + 1,
        seq: 1,
        state: StoreState::default(),
    };
    let json = serde_json::to_vec(&snapshot).unwrap();
    let compressed = zstd::encode_all(json.as_slice(), 3).unwrap();
    std::fs::write(&path, compressed).unwrap();

    assert!(matches!(
        Snapshot::load(&path),
        Err(SnapshotError::VersionTooNew { .. })
    ));
}

#[test]
fn save_replaces_existing_snapshot_atomically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.snapshot");
    Snapshot::save(&path, 1, &StoreState::default()).unwrap();
    Snapshot::save(&path, 2, &populated_state()).unwrap();

    let snapshot = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(snapshot.seq, 2);
    assert!(!path.with_extension("tmp").exists());
}
