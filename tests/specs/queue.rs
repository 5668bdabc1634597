// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Queue scenarios: backoff timing, dead-lettering, lease recovery.

use async_trait::async_trait;
use parking_lot::Mutex;
use sift_core::{BackoffPolicy, EnqueueOptions, FakeClock, JobState, Metrics};
use sift_engine::{
    HandlerError, HandlerRegistry, Janitor, JobContext, JobHandler, QueueConfig, QueueEngine,
};
use sift_storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

struct FlakyHandler {
    failures_remaining: Mutex<u32>,
    observed_at_ms: Mutex<Vec<u64>>,
    clock: FakeClock,
}

#[async_trait]
impl JobHandler for FlakyHandler {
    async fn run(
        &self,
        _payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        self.observed_at_ms.lock().push(sift_core::Clock::epoch_ms(&self.clock));
        let mut remaining = self.failures_remaining.lock();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(HandlerError::Transient("transient fault".to_string()));
        }
        Ok(serde_json::json!("ok"))
    }
}

fn engine(
    handler: Arc<dyn JobHandler>,
    clock: FakeClock,
) -> Arc<QueueEngine<FakeClock>> {
    let mut registry = HandlerRegistry::new();
    registry.register("work", "task", handler);
    let mut queues = HashMap::new();
    queues.insert(
        "work".to_string(),
        QueueConfig {
            concurrency: 2,
            visibility_timeout_ms: 30_000,
            default_max_attempts: 3,
            default_backoff: BackoffPolicy::fixed(100, 10_000),
            poll_interval_ms: 5,
        },
    );
    Arc::new(QueueEngine::new(
        Arc::new(Store::in_memory()),
        clock,
        Arc::new(Metrics::default()),
        registry,
        queues,
    ))
}

/// Drive the queue with the clock until the job leaves the given state set.
async fn drive_until_terminal(
    engine: &QueueEngine<FakeClock>,
    clock: &FakeClock,
    job_id: &sift_core::JobId,
) {
    for _ in 0..32 {
        let job = engine.store().job(job_id).unwrap_or_else(|| panic!("job vanished"));
        if job.is_terminal() {
            return;
        }
        if job.is_ready(sift_core::Clock::epoch_ms(clock)) {
            engine.step("work", "w-0").await.unwrap();
        } else {
            clock.advance(Duration::from_millis(50));
        }
    }
    panic!("job never reached a terminal state");
}

/// S4: two transient failures then success, with ~100ms and ~200ms delays.
#[tokio::test]
async fn backoff_delays_follow_the_policy() {
    let clock = FakeClock::at_epoch_ms(1_000);
    let handler = Arc::new(FlakyHandler {
        failures_remaining: Mutex::new(2),
        observed_at_ms: Mutex::new(Vec::new()),
        clock: clock.clone(),
    });
    let engine = engine(handler.clone(), clock.clone());

    let opts = EnqueueOptions::default()
        .max_attempts(5)
        .backoff(BackoffPolicy::fixed(100, 10_000));
    let job_id = engine.enqueue("work", "task", serde_json::Value::Null, opts).unwrap();

    drive_until_terminal(&engine, &clock, &job_id).await;

    let job = engine.store().job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.attempts, 2);

    let observed = handler.observed_at_ms.lock();
    assert_eq!(observed.len(), 3);
    // First retry after ~100ms, second after ~200ms (fixed policy: exact).
    assert_eq!(observed[1] - observed[0], 100);
    assert_eq!(observed[2] - observed[1], 200);
}

/// S5: always-failing job walks waiting → active cycles into dead, emitting
/// one dead-letter event.
#[tokio::test]
async fn dead_letter_after_exhausted_attempts() {
    let clock = FakeClock::at_epoch_ms(0);
    let handler = Arc::new(FlakyHandler {
        failures_remaining: Mutex::new(u32::MAX),
        observed_at_ms: Mutex::new(Vec::new()),
        clock: clock.clone(),
    });
    let engine = engine(handler.clone(), clock.clone());
    let mut dead_letters = engine.dead_letters();

    let opts = EnqueueOptions::default()
        .max_attempts(3)
        .backoff(BackoffPolicy::fixed(100, 10_000));
    let job_id = engine.enqueue("work", "task", serde_json::Value::Null, opts).unwrap();

    drive_until_terminal(&engine, &clock, &job_id).await;

    let job = engine.store().job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Dead);
    assert_eq!(job.attempts, 3);
    assert_eq!(handler.observed_at_ms.lock().len(), 3);

    let letter = dead_letters.recv().await.unwrap();
    assert_eq!(letter.job_id, job_id);
    assert_eq!(letter.attempts, 3);
    assert!(dead_letters.try_recv().is_err(), "exactly one dead-letter event");
}

/// Property 6: a worker that dies mid-job loses its lease to the janitor;
/// another worker runs the job and attempts increments by one.
#[tokio::test]
async fn expired_lease_is_recovered_exactly_once() {
    let clock = FakeClock::at_epoch_ms(0);
    let handler = Arc::new(FlakyHandler {
        failures_remaining: Mutex::new(0),
        observed_at_ms: Mutex::new(Vec::new()),
        clock: clock.clone(),
    });
    let engine = engine(handler.clone(), clock.clone());
    let janitor = Janitor::new(&engine, Duration::from_millis(10));

    let job_id = engine
        .enqueue("work", "task", serde_json::Value::Null, EnqueueOptions::default())
        .unwrap();

    // Claim and "crash": the claim happens directly against the store, so
    // no handler runs and the lease is left dangling.
    engine.store().claim_next("work", "w-dead", 0, 30_000).unwrap().unwrap();

    clock.advance(Duration::from_millis(30_000));
    assert_eq!(janitor.sweep().unwrap(), 1);
    assert_eq!(janitor.sweep().unwrap(), 0, "recovery happens once");

    let job = engine.store().job(&job_id).unwrap();
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.attempts, 1);

    // A healthy worker picks it up and finishes.
    assert!(engine.step("work", "w-1").await.unwrap());
    assert_eq!(engine.store().job(&job_id).unwrap().state, JobState::Completed);
    assert_eq!(handler.observed_at_ms.lock().len(), 1);
}
