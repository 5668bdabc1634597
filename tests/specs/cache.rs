// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Cache scenarios: single-flight and refresh-driven invalidation.

use sift_core::{fingerprint, FakeClock, Metrics, SystemClock, TenantId};
use sift_engine::handlers::{FakeWarehouse, RefreshViewHandler};
use sift_engine::{Cache, CacheConfig, CacheOrchestrator, JobContext, JobHandler, LeaseExtender};
use sift_storage::Store;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// S6: fifty concurrent callers on a cold key, one producer run, one value.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn fifty_callers_one_producer() {
    let orchestrator = Arc::new(CacheOrchestrator::new(
        Arc::new(Cache::new(SystemClock)),
        CacheConfig { default_ttl_ms: 60_000, flight_ttl_ms: 5_000, poll_ceiling_ms: 25 },
        Arc::new(Metrics::default()),
    ));
    let runs = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let orchestrator = Arc::clone(&orchestrator);
        let runs = Arc::clone(&runs);
        tasks.push(tokio::spawn(async move {
            orchestrator
                .get_or_compute("pipeline_kpis:acme:cold", 60_000, move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(40)).await;
                    Ok(b"kpi-value".to_vec())
                })
                .await
                .unwrap()
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), b"kpi-value", "all callers observe the same value");
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1, "exactly one producer ran");
}

/// Property 10: after `refresh_view` succeeds, dependent fingerprints
/// recompute on the next access.
#[tokio::test]
async fn refresh_invalidates_dependent_fingerprints() {
    let clock = FakeClock::at_epoch_ms(10_000);
    let store = Arc::new(Store::in_memory());
    let warehouse = Arc::new(FakeWarehouse::new());
    let orchestrator = Arc::new(CacheOrchestrator::new(
        Arc::new(Cache::new(clock.clone())),
        CacheConfig::default(),
        Arc::new(Metrics::default()),
    ));

    let mut statements = HashMap::new();
    statements.insert("v_pipeline".to_string(), "REFRESH v_pipeline".to_string());
    let mut dependents = HashMap::new();
    dependents.insert("v_pipeline".to_string(), vec!["pipeline_kpis".to_string()]);
    let refresh = RefreshViewHandler::new(
        Arc::clone(&store),
        warehouse,
        Arc::clone(&orchestrator),
        clock.clone(),
        statements,
        dependents,
    );

    // Warm the cache for two tenants of the dependent query.
    let runs = Arc::new(AtomicUsize::new(0));
    for tenant in ["acme", "globex"] {
        let key = fingerprint(
            &TenantId::new(tenant),
            "pipeline_kpis",
            &serde_json::json!({"window": "7d"}),
            "v0",
        );
        let runs = Arc::clone(&runs);
        orchestrator
            .get_or_compute(key.as_str(), 600_000, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(b"warm".to_vec())
            })
            .await
            .unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    let ctx = JobContext {
        job_id: sift_core::JobId::new(),
        queue: "refresh".to_string(),
        attempt: 1,
        tenant_id: None,
        correlation_id: None,
        deadline_ms: u64::MAX,
        cancellation: CancellationToken::new(),
        lease: LeaseExtender::noop(),
    };
    let result = refresh
        .run(serde_json::json!({"view_name": "v_pipeline"}), ctx)
        .await
        .unwrap();
    assert_eq!(result["invalidated"], 2);

    // Both tenants recompute on next access.
    for tenant in ["acme", "globex"] {
        let key = fingerprint(
            &TenantId::new(tenant),
            "pipeline_kpis",
            &serde_json::json!({"window": "7d"}),
            "v0",
        );
        let runs = Arc::clone(&runs);
        orchestrator
            .get_or_compute(key.as_str(), 600_000, move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok(b"recomputed".to_vec())
            })
            .await
            .unwrap();
    }
    assert_eq!(runs.load(Ordering::SeqCst), 4, "every dependent fingerprint recomputed");
}
