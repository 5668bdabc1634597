// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use crate::ingestion::IngestionConfig;
use crate::registry::{FieldKind, InMemoryRegistry, Schema, SchemaField};
use crate::transport::InMemoryLog;
use chrono::TimeZone;
use sift_core::{EventEnvelope, EventKind, ProcessingStatus, SystemClock};
use sift_storage::Store;

struct Rig {
    log: Arc<InMemoryLog>,
    registry: Arc<InMemoryRegistry>,
    store: Arc<Store>,
    metrics: Arc<Metrics>,
    consumer: Arc<StreamConsumer<InMemoryLog, InMemoryRegistry, SystemClock>>,
}

fn rig(config: ConsumerConfig) -> Rig {
    let log = Arc::new(InMemoryLog::new());
    log.create_topic("crm.leads", 2);
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(Schema {
        id: 1,
        subject: "crm.lead".to_string(),
        fields: vec![SchemaField {
            name: "name".to_string(),
            kind: FieldKind::Str,
            required: true,
        }],
    });
    let store = Arc::new(Store::in_memory());
    let metrics = Arc::new(Metrics::default());
    let handler = Arc::new(IngestionHandler::new(
        Arc::clone(&store),
        SystemClock,
        Arc::clone(&metrics),
        IngestionConfig::default(),
    ));
    let consumer = StreamConsumer::new(
        Arc::clone(&log),
        Arc::new(CachingSchemaClient::new(Arc::clone(&registry))),
        handler,
        Arc::clone(&metrics),
        config,
    );
    Rig { log, registry, store, metrics, consumer }
}

fn config() -> ConsumerConfig {
    ConsumerConfig {
        topics: vec!["crm.leads".to_string()],
        group_id: "test-group".to_string(),
        poll_batch: 16,
        poll_interval_ms: 5,
        handshake_timeout_ms: 1_000,
        reconnect_backoff: BackoffPolicy::fixed(5, 50),
    }
}

fn envelope(event_id: &str) -> EventEnvelope {
    EventEnvelope {
        event_id: event_id.to_string(),
        event_type: EventKind::LeadCreated,
        tenant_id: "acme".to_string(),
        timestamp: chrono::Utc.timestamp_millis_opt(1_768_473_000_000).unwrap(),
        data: serde_json::json!({"name": "Jane"}),
        metadata: sift_core::EventMetadata {
            source: "crm".to_string(),
            version: "1.0".to_string(),
            correlation_id: None,
        },
    }
}

async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
    while !check() {
        assert!(std::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn happy_path_lands_and_commits_in_order() {
    let rig = rig(config());
    for id in ["a", "b", "c"] {
        rig.log.publish_json("crm.leads", 0, &envelope(id));
    }

    let handle = rig.consumer.start().await.unwrap();
    assert_eq!(handle.assignment().len(), 2);

    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| s.event_log.len() == 3)).await;
    handle.stop().await;

    rig.store.read(|state| {
        for id in ["a", "b", "c"] {
            assert!(state.staging_row(id).is_some());
            assert_eq!(state.log_entries(id)[0].status, ProcessingStatus::Processed);
        }
        // Per-partition order: offsets appear in sequence.
        let offsets: Vec<i64> = state.event_log.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    });
    let tp = TopicPartition::new("crm.leads", 0);
    assert_eq!(rig.log.committed_offset("test-group", &tp), 3);
}

#[tokio::test]
async fn republish_is_skipped_and_committed() {
    let rig = rig(config());
    for id in ["a", "b", "c"] {
        rig.log.publish_json("crm.leads", 0, &envelope(id));
    }

    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| s.event_log.len() == 3)).await;

    // Same three events again.
    for id in ["a", "b", "c"] {
        rig.log.publish_json("crm.leads", 0, &envelope(id));
    }
    wait_until(2_000, || store.read(|s| s.event_log.len() == 6)).await;
    handle.stop().await;

    rig.store.read(|state| {
        assert_eq!(state.staging[&sift_core::envelope::StagingKind::Lead].row_count(), 3);
        for id in ["a", "b", "c"] {
            let entries = state.log_entries(id);
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].status, ProcessingStatus::Processed);
            assert_eq!(entries[1].status, ProcessingStatus::Skipped);
        }
    });
}

#[tokio::test]
async fn framed_records_validate_against_registry() {
    let rig = rig(config());
    rig.log.publish_framed("crm.leads", 0, 1, &envelope("framed-1"));

    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| !s.event_log.is_empty())).await;
    handle.stop().await;

    rig.store.read(|state| assert!(state.staging_row("framed-1").is_some()));
}

#[tokio::test]
async fn undecodable_record_is_skipped_with_decode_failed() {
    let rig = rig(config());
    rig.log.publish("crm.leads", 0, b"\x02 garbage".to_vec());
    rig.log.publish_json("crm.leads", 0, &envelope("after"));

    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| s.event_log.len() == 2)).await;
    handle.stop().await;

    rig.store.read(|state| {
        let skip = state.log_entries("crm.leads:0:0");
        assert_eq!(skip.len(), 1);
        assert_eq!(skip[0].status, ProcessingStatus::Skipped);
        assert!(skip[0].error_message.as_deref().unwrap_or_default().contains("decode_failed"));
        assert!(state.staging_row("after").is_some());
    });
}

#[tokio::test]
async fn transport_outage_reconnects_with_backoff() {
    let rig = rig(config());
    rig.log.publish_json("crm.leads", 0, &envelope("a"));
    rig.log.fail_next_polls(6);

    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(3_000, || store.read(|s| !s.event_log.is_empty())).await;
    handle.stop().await;

    rig.store.read(|state| assert!(state.staging_row("a").is_some()));
}

#[tokio::test]
async fn failure_before_commit_redelivers_without_duplicate_rows() {
    let rig = rig(config());
    let tp = TopicPartition::new("crm.leads", 0);
    rig.log.publish_json("crm.leads", 0, &envelope("a"));

    // First consumption committed nothing (simulated crash after the
    // durable write): land the event directly, leave the offset at 0.
    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| !s.event_log.is_empty())).await;
    handle.stop().await;
    rig.log.commit_reset("test-group", &tp);

    // Restart: the record is re-delivered and absorbed as a duplicate.
    let handle = rig.consumer.start().await.unwrap();
    wait_until(2_000, || store.read(|s| s.event_log.len() == 2)).await;
    handle.stop().await;

    rig.store.read(|state| {
        assert_eq!(state.staging[&sift_core::envelope::StagingKind::Lead].row_count(), 1);
        let entries = state.log_entries("a");
        assert_eq!(entries[0].status, ProcessingStatus::Processed);
        assert_eq!(entries[1].status, ProcessingStatus::Skipped);
    });
    assert_eq!(rig.log.committed_offset("test-group", &tp), 1);
}

#[tokio::test]
async fn pause_stops_progress_until_resume() {
    let rig = rig(config());
    let tp = TopicPartition::new("crm.leads", 0);

    let handle = rig.consumer.start().await.unwrap();
    handle.pause(std::slice::from_ref(&tp));
    // Give the loop a moment to observe the pause.
    tokio::time::sleep(Duration::from_millis(30)).await;

    rig.log.publish_json("crm.leads", 0, &envelope("a"));
    tokio::time::sleep(Duration::from_millis(100)).await;
    rig.store.read(|state| assert!(state.event_log.is_empty()));

    handle.resume(std::slice::from_ref(&tp));
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| !s.event_log.is_empty())).await;
    handle.stop().await;
}

#[tokio::test]
async fn halted_partition_emits_fatal_alert() {
    use sift_engine::handlers::MemoryChannel;

    let rig = rig(config());
    let channel = Arc::new(MemoryChannel::new("ops"));
    rig.consumer.add_fatal_alert_channel(channel.clone());
    rig.log.publish_json("crm.leads", 1, &envelope("survivor"));

    let handle = rig.consumer.start().await.unwrap();
    // Partition 0 disappears from the broker: its loop halts fatally while
    // partition 1 keeps consuming.
    rig.log.remove_partition("crm.leads", 0);

    let sent = Arc::clone(&channel);
    wait_until(2_000, move || !sent.sent.lock().is_empty()).await;
    let store = Arc::clone(&rig.store);
    wait_until(2_000, move || store.read(|s| !s.event_log.is_empty())).await;
    handle.stop().await;

    let firings = channel.sent.lock();
    assert_eq!(firings.len(), 1);
    assert_eq!(firings[0].name, "ingest partition halted");
    assert!(firings[0].alert_id.contains("crm.leads[0]"));
    assert_eq!(rig.metrics.snapshot().partitions_halted, 1);
    rig.store.read(|state| assert!(state.staging_row("survivor").is_some()));
}

#[tokio::test]
async fn unknown_topic_fails_startup_with_config_error() {
    let rig = rig(ConsumerConfig {
        topics: vec!["missing.topic".to_string()],
        ..config()
    });
    let err = rig.consumer.start().await.unwrap_err();
    assert_eq!(err.kind, sift_core::ErrorKind::Config);
}

#[tokio::test]
async fn replay_reprocesses_range_and_reports_counts() {
    let rig = rig(config());
    for id in ["a", "b", "c"] {
        rig.log.publish_json("crm.leads", 0, &envelope(id));
    }

    // First pass: everything lands.
    let handle = rig.consumer.start().await.unwrap();
    let store = Arc::clone(&rig.store);
    wait_until(2_000, || store.read(|s| s.event_log.len() == 3)).await;
    handle.stop().await;

    // Replay from offset 1: both records already landed.
    let report = rig.consumer.replay("crm.leads", 0, 1).await.unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 2);
    assert_eq!(report.failed, 0);

    let tp = TopicPartition::new("crm.leads", 0);
    assert_eq!(rig.log.committed_offset("test-group", &tp), 3);
}

#[tokio::test]
async fn resume_is_automatic_when_saturation_clears() {
    // One permit and a low-water mark of one: the second record saturates
    // while the first holds the permit, then progress resumes.
    let log = Arc::new(InMemoryLog::new());
    log.create_topic("crm.leads", 1);
    let registry = Arc::new(InMemoryRegistry::new());
    let store = Arc::new(Store::in_memory());
    let metrics = Arc::new(Metrics::default());
    let handler = Arc::new(IngestionHandler::new(
        Arc::clone(&store),
        SystemClock,
        Arc::clone(&metrics),
        IngestionConfig { max_inflight: 1, resume_low_water: 1, ..IngestionConfig::default() },
    ));
    let consumer = StreamConsumer::new(
        Arc::clone(&log),
        Arc::new(CachingSchemaClient::new(registry)),
        handler,
        metrics,
        config(),
    );

    for id in ["a", "b", "c", "d"] {
        log.publish_json("crm.leads", 0, &envelope(id));
    }
    let handle = consumer.start().await.unwrap();
    let probe = Arc::clone(&store);
    wait_until(3_000, || probe.read(|s| s.event_log.len() == 4)).await;
    handle.stop().await;
}
