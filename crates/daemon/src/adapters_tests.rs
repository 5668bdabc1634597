// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use sift_ingest::FieldKind;

#[tokio::test]
async fn file_log_round_trips_records() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileLog::new(dir.path());

    assert_eq!(log.publish("crm.leads", 0, b"one").unwrap(), 0);
    assert_eq!(log.publish("crm.leads", 0, b"two").unwrap(), 1);
    assert_eq!(log.publish("crm.leads", 1, b"other").unwrap(), 0);

    let assigned = log.subscribe(&["crm.leads".to_string()], "g").await.unwrap();
    assert_eq!(assigned.len(), 2);

    let tp = TopicPartition::new("crm.leads", 0);
    let records = log.poll(&tp, 0, 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].payload, b"one");
    assert_eq!(records[1].offset, 1);

    // Poll from an offset skips earlier records.
    let records = log.poll(&tp, 1, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload, b"two");

    assert_eq!(log.latest_offset(&tp).await.unwrap(), 2);
}

#[tokio::test]
async fn file_log_commit_persists_per_group() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileLog::new(dir.path());
    log.publish("t", 0, b"x").unwrap();
    let tp = TopicPartition::new("t", 0);

    assert_eq!(log.committed("g1", &tp).await.unwrap(), 0);
    log.commit("g1", &tp, 5).await.unwrap();
    assert_eq!(log.committed("g1", &tp).await.unwrap(), 5);
    assert_eq!(log.committed("g2", &tp).await.unwrap(), 0);
}

#[tokio::test]
async fn file_log_subscribe_unknown_topic_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let log = FileLog::new(dir.path());
    let err = log.subscribe(&["ghost".to_string()], "g").await.unwrap_err();
    assert!(matches!(err, TransportError::Config(_)));
}

#[test]
fn hex_round_trips() {
    let bytes = vec![0x00, 0x01, 0xff, 0x7f];
    assert_eq!(hex_decode(&hex_encode(&bytes)).unwrap(), bytes);
    assert!(hex_decode("zz").is_none());
    assert!(hex_decode("abc").is_none());
}

#[tokio::test]
async fn fs_blob_store_writes_and_signs() {
    let dir = tempfile::tempdir().unwrap();
    let blobs = FsBlobStore::new(dir.path(), "key");

    let location = blobs.put("exports/a/b.csv", b"data".to_vec()).await.unwrap();
    assert!(location.starts_with("file://"));
    assert_eq!(std::fs::read(dir.path().join("exports/a/b.csv")).unwrap(), b"data");

    let url = blobs.signed_url(&location, 60_000);
    assert!(url.contains("ttl=60000"));
    assert!(url.contains("sig="));
    // Signatures are stable for the same location and ttl.
    assert_eq!(url, blobs.signed_url(&location, 60_000));
    assert_ne!(url, blobs.signed_url(&location, 30_000));
}

#[tokio::test]
async fn file_registry_loads_schema_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schemas.json");
    std::fs::write(
        &path,
        r#"[{"id": 3, "subject": "crm.lead", "fields": [
            {"name": "name", "kind": "str", "required": true}
        ]}]"#,
    )
    .unwrap();

    let registry = FileRegistry::load(&path).unwrap();
    let schema = registry.fetch(3).await.unwrap();
    assert_eq!(schema.subject, "crm.lead");
    assert_eq!(schema.fields[0].kind, FieldKind::Str);

    assert!(matches!(registry.fetch(4).await, Err(RegistryError::NotFound(4))));
}

#[tokio::test]
async fn missing_schema_file_yields_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FileRegistry::load(&dir.path().join("nope.json")).unwrap();
    assert!(matches!(registry.fetch(1).await, Err(RegistryError::NotFound(1))));
}
