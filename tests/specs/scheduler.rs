// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Scheduler scenarios: boundary fires and catch-up collapse.

use sift_core::{FakeClock, Metrics, ScheduleId};
use sift_engine::{HandlerRegistry, QueueConfig, QueueEngine, Scheduler, SchedulerConfig};
use sift_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;

fn ms(rfc3339: &str) -> u64 {
    chrono::DateTime::parse_from_rfc3339(rfc3339).unwrap().timestamp_millis() as u64
}

fn rig(start: &str) -> (Arc<QueueEngine<FakeClock>>, Scheduler<FakeClock>, FakeClock) {
    let clock = FakeClock::at_epoch_ms(ms(start));
    let mut queues = HashMap::new();
    queues.insert("reports".to_string(), QueueConfig::default());
    let engine = Arc::new(QueueEngine::new(
        Arc::new(Store::in_memory()),
        clock.clone(),
        Arc::new(Metrics::default()),
        HandlerRegistry::new(),
        queues,
    ));
    let scheduler = Scheduler::new(&engine, SchedulerConfig::default());
    (engine, scheduler, clock)
}

/// S3, running branch: ticks across 12 minutes fire once per crossed
/// boundary of a five-minute cron.
#[tokio::test]
async fn live_ticks_fire_each_boundary() {
    let (engine, scheduler, _clock) = rig("2026-04-01T09:00:00Z");
    scheduler
        .upsert(
            ScheduleId::new(),
            "*/5 * * * *",
            "reports",
            "report_generate",
            serde_json::json!({"report_id": "weekly"}),
            Some("acme".to_string()),
            true,
        )
        .unwrap();

    let mut fired = 0;
    for minute in 1..=12 {
        let now = ms("2026-04-01T09:00:00Z") + minute * 60_000;
        fired += scheduler.fire_due(now).unwrap();
    }

    assert_eq!(fired, 2, "boundaries at 09:05 and 09:10");
    assert_eq!(engine.stats("reports").unwrap().waiting, 2);
}

/// S3, downtime branch: 12 minutes of missed fires collapse to one
/// catch-up, and next_fire_at lands strictly after now.
#[tokio::test]
async fn downtime_collapses_to_one_catchup() {
    let (engine, scheduler, _clock) = rig("2026-04-01T09:00:00Z");
    let schedule = scheduler
        .upsert(
            ScheduleId::new(),
            "*/5 * * * *",
            "reports",
            "report_generate",
            serde_json::json!({"report_id": "weekly"}),
            None,
            true,
        )
        .unwrap();

    let restart = ms("2026-04-01T09:12:00Z");
    assert_eq!(scheduler.fire_due(restart).unwrap(), 1);
    assert_eq!(engine.stats("reports").unwrap().waiting, 1);

    let stored = engine.store().schedule(&schedule.id).unwrap();
    assert_eq!(stored.next_fire_at_ms, ms("2026-04-01T09:15:00Z"));

    // Property 8 tail: firing again at the same instant adds nothing.
    assert_eq!(scheduler.fire_due(restart).unwrap(), 0);
    assert_eq!(engine.stats("reports").unwrap().waiting, 1);
}

/// A crash between enqueue and advance re-fires with the same dedup key
/// and is absorbed.
#[tokio::test]
async fn refire_for_same_boundary_deduplicates() {
    let (engine, scheduler, _clock) = rig("2026-04-01T09:00:00Z");
    let schedule = scheduler
        .upsert(
            ScheduleId::new(),
            "*/5 * * * *",
            "reports",
            "report_generate",
            serde_json::json!({}),
            None,
            true,
        )
        .unwrap();
    let boundary = ms("2026-04-01T09:05:00Z");

    // Simulate the crash replay: fire the same boundary twice directly.
    let opts = || {
        sift_core::EnqueueOptions::default()
            .deduplication_key(format!("sched:{}:{}", schedule.id, boundary))
    };
    let (first, fresh) = engine
        .store()
        .fire_schedule(
            &schedule.id,
            "reports",
            "report_generate",
            serde_json::json!({}),
            opts(),
            boundary,
            boundary + 300_000,
        )
        .unwrap();
    assert!(fresh);
    let (second, fresh) = engine
        .store()
        .fire_schedule(
            &schedule.id,
            "reports",
            "report_generate",
            serde_json::json!({}),
            opts(),
            boundary,
            boundary + 300_000,
        )
        .unwrap();
    assert!(!fresh);
    assert_eq!(second, first);
    assert_eq!(engine.stats("reports").unwrap().waiting, 1);
}
