// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use crate::admin::Admin;
use crate::adapters::FileLog;
use crate::config::QueueSection;
use sift_core::JobState;
use std::time::Duration;

fn base_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.state_dir = Some(dir.to_path_buf());
    config.queue.insert("refresh".to_string(), QueueSection::default());
    config.queue.insert("ingest".to_string(), QueueSection::default());
    config
}

fn envelope_json(event_id: &str) -> Vec<u8> {
    format!(
        r#"{{"eventId":"{event_id}","eventType":"lead.created","tenantId":"acme",
            "timestamp":"2026-01-15T10:30:00Z","data":{{"name":"Jane"}},
            "metadata":{{"source":"crm","version":"1.0"}}}}"#
    )
    .into_bytes()
}

async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + Duration::from_millis(deadline_ms);
    while !check() {
        assert!(std::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn startup_runs_jobs_and_shuts_down_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(base_config(dir.path()), Collaborators::default())
        .await
        .unwrap();
    let admin = Admin::new(Arc::clone(&daemon));

    // No refresh statement is registered, so the job dead-letters with a
    // permanent error; what matters here is the full claim/run/settle path.
    let job_id = admin
        .enqueue("refresh", "refresh_view", serde_json::json!({"view_name": "v1"}))
        .unwrap();

    let store = Arc::clone(&daemon.store);
    let probe = job_id.clone();
    wait_until(5_000, move || {
        store.job(&probe).map(|j| j.state == JobState::Dead).unwrap_or(false)
    })
    .await;

    assert_eq!(admin.queue_stats("refresh").unwrap().dead, 1);
    assert!(admin.metrics().jobs_enqueued >= 1);
    daemon.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn second_daemon_on_same_state_dir_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(base_config(dir.path()), Collaborators::default())
        .await
        .unwrap();

    let err = Daemon::start(base_config(dir.path()), Collaborators::default())
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 1);

    daemon.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn ingestion_consumes_published_records_end_to_end() {
    let dir = tempfile::tempdir().unwrap();

    // Produce before startup so subscription finds the partition.
    let log = FileLog::new(dir.path().join("log"));
    log.publish("crm.leads", 0, &envelope_json("a")).unwrap();
    log.publish("crm.leads", 0, &envelope_json("b")).unwrap();

    let mut config = base_config(dir.path());
    config.ingestion.topics = vec!["crm.leads".to_string()];
    let daemon = Daemon::start(config, Collaborators::default()).await.unwrap();
    let admin = Admin::new(Arc::clone(&daemon));

    let store = Arc::clone(&daemon.store);
    wait_until(5_000, move || store.read(|s| s.event_log.len() == 2)).await;

    daemon.store.read(|state| {
        assert!(state.staging_row("a").is_some());
        assert!(state.staging_row("b").is_some());
    });

    // Replay the partition: both events are absorbed as duplicates.
    let outcome = admin.replay("crm.leads", 0, 0).await.unwrap();
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.skipped, 2);
    assert_eq!(outcome.failed, 0);

    let snapshot = admin.metrics();
    assert_eq!(snapshot.events_processed, 2);
    assert!(snapshot.events_skipped >= 2);

    daemon.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn schedules_survive_via_admin_surface() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(base_config(dir.path()), Collaborators::default())
        .await
        .unwrap();
    let admin = Admin::new(Arc::clone(&daemon));

    let schedule = admin
        .upsert_schedule(
            sift_core::ScheduleId::new(),
            "*/5 * * * *",
            "refresh",
            "refresh_view",
            serde_json::json!({"view_name": "v1"}),
            Some("acme".to_string()),
        )
        .unwrap();
    assert_eq!(admin.schedules(Some(true)).len(), 1);

    admin.disable_schedule(&schedule.id).unwrap();
    assert!(admin.schedules(Some(true)).is_empty());
    assert_eq!(admin.schedules(None).len(), 1);

    daemon.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cache_invalidation_is_exposed() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = Daemon::start(base_config(dir.path()), Collaborators::default())
        .await
        .unwrap();
    let admin = Admin::new(Arc::clone(&daemon));

    daemon.orchestrator.cache().put("pipeline_kpis:acme:aa", b"v".to_vec(), 60_000);
    assert_eq!(admin.invalidate_cache("pipeline_kpis:"), 1);
    assert_eq!(admin.invalidate_cache("pipeline_kpis:"), 0);

    daemon.shutdown().await;
}

#[test]
fn startup_errors_map_to_exit_codes() {
    assert_eq!(StartupError::Config("x".into()).exit_code(), 1);
    assert_eq!(StartupError::Storage("x".into()).exit_code(), 2);
    assert_eq!(StartupError::Registry("x".into()).exit_code(), 3);
}
