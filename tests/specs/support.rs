// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Shared rig builders for the scenario suite.

use sift_core::{EventEnvelope, EventKind, EventMetadata, Metrics, SystemClock};
use sift_ingest::{
    CachingSchemaClient, ConsumerConfig, InMemoryLog, InMemoryRegistry, IngestionConfig,
    IngestionHandler, StreamConsumer,
};
use sift_storage::Store;
use std::sync::Arc;
use std::time::Duration;

pub struct IngestRig {
    pub log: Arc<InMemoryLog>,
    pub store: Arc<Store>,
    pub metrics: Arc<Metrics>,
    pub consumer: Arc<StreamConsumer<InMemoryLog, InMemoryRegistry, SystemClock>>,
}

pub fn ingest_rig(topic: &str, partitions: i32) -> IngestRig {
    let log = Arc::new(InMemoryLog::new());
    log.create_topic(topic, partitions);
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
        Arc::new(CachingSchemaClient::new(Arc::new(InMemoryRegistry::new()))),
        handler,
        Arc::clone(&metrics),
        ConsumerConfig {
            topics: vec![topic.to_string()],
            group_id: "specs".to_string(),
            poll_batch: 32,
            poll_interval_ms: 5,
            handshake_timeout_ms: 1_000,
            reconnect_backoff: sift_core::BackoffPolicy::fixed(5, 50),
        },
    );
    IngestRig { log, store, metrics, consumer }
}

pub fn lead_event(event_id: &str) -> EventEnvelope {
    EventEnvelope {
        event_id: event_id.to_string(),
        event_type: EventKind::LeadCreated,
        tenant_id: "acme".to_string(),
        timestamp: chrono_parse("2026-01-15T10:30:00Z"),
        data: serde_json::json!({"name": "Jane", "source": "webform"}),
        metadata: EventMetadata {
            source: "crm".to_string(),
            version: "1.0".to_string(),
            correlation_id: Some("cor-specs".to_string()),
        },
    }
}

fn chrono_parse(rfc3339: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(rfc3339)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_default()
}

/// Poll until `check` holds or the deadline passes.
pub async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
    while !check() {
        assert!(std::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
