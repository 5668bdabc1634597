// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use sift_core::job::{EnqueueOptions, Job, JobId, JobState};

fn enqueue(state: &mut StoreState, queue: &str, opts: EnqueueOptions) -> JobId {
    let job = Job::from_enqueue(
        JobId::new(),
        queue,
        "refresh_view",
        serde_json::Value::Null,
        opts,
        1_000,
    );
    let id = job.id.clone();
    state.apply(&StoreEvent::JobEnqueued { job });
    id
}

#[test]
fn enqueue_assigns_monotonic_seq() {
    let mut state = StoreState::default();
    let a = enqueue(&mut state, "q", EnqueueOptions::default());
    let b = enqueue(&mut state, "q", EnqueueOptions::default());

    assert_eq!(state.jobs[&a].seq, 0);
    assert_eq!(state.jobs[&b].seq, 1);
    assert_eq!(state.next_job_seq, 2);
}

#[test]
fn replayed_enqueue_is_idempotent() {
    let mut state = StoreState::default();
    let job = Job::from_enqueue(
        JobId::new(),
        "q",
        "k",
        serde_json::Value::Null,
        EnqueueOptions::default(),
        0,
    );
    let event = StoreEvent::JobEnqueued { job };
    state.apply(&event);
    state.apply(&event);

    assert_eq!(state.jobs.len(), 1);
    assert_eq!(state.next_job_seq, 1);
}

#[test]
fn claim_marks_active_with_lease() {
    let mut state = StoreState::default();
    let id = enqueue(&mut state, "q", EnqueueOptions::default());
    state.apply(&StoreEvent::JobClaimed {
        job_id: id.clone(),
        lease_until_ms: 31_000,
        worker: "q-0".to_string(),
    });

    let job = &state.jobs[&id];
    assert_eq!(job.state, JobState::Active);
    assert_eq!(job.lease_until_ms, Some(31_000));
    assert_eq!(job.attempts, 0);
}

#[test]
fn retried_increments_attempts_once() {
    let mut state = StoreState::default();
    let id = enqueue(&mut state, "q", EnqueueOptions::default());
    state.apply(&StoreEvent::JobClaimed {
        job_id: id.clone(),
        lease_until_ms: 31_000,
        worker: "q-0".to_string(),
    });

    let event = StoreEvent::JobRetried {
        job_id: id.clone(),
        error: "boom".to_string(),
        next_available_at_ms: 2_000,
    };
    state.apply(&event);
    // Replay of the same event must not double-count the attempt.
    state.apply(&event);

    let job = &state.jobs[&id];
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.attempts, 1);
    assert_eq!(job.available_at_ms, 2_000);
    assert_eq!(job.last_error.as_deref(), Some("boom"));
    assert!(job.lease_until_ms.is_none());
}

#[test]
fn dead_clears_dedup_index() {
    let mut state = StoreState::default();
    let id = enqueue(&mut state, "q", EnqueueOptions::default().deduplication_key("v1"));
    assert!(state.dedup_index.contains_key(&("q".to_string(), "v1".to_string())));

    state.apply(&StoreEvent::JobClaimed {
        job_id: id.clone(),
        lease_until_ms: 1,
        worker: "q-0".to_string(),
    });
    state.apply(&StoreEvent::JobDead { job_id: id.clone(), error: "gone".to_string() });

    assert_eq!(state.jobs[&id].state, JobState::Dead);
    assert!(!state.dedup_index.contains_key(&("q".to_string(), "v1".to_string())));
}

#[test]
fn completed_stores_result_and_clears_lease() {
    let mut state = StoreState::default();
    let id = enqueue(&mut state, "q", EnqueueOptions::default());
    state.apply(&StoreEvent::JobClaimed {
        job_id: id.clone(),
        lease_until_ms: 1,
        worker: "q-0".to_string(),
    });
    state.apply(&StoreEvent::JobCompleted {
        job_id: id.clone(),
        result: serde_json::json!({"rows": 10}),
    });

    let job = &state.jobs[&id];
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result, Some(serde_json::json!({"rows": 10})));
    assert!(job.lease_until_ms.is_none());
}

#[test]
fn lease_recovery_only_touches_active_jobs() {
    let mut state = StoreState::default();
    let id = enqueue(&mut state, "q", EnqueueOptions::default());

    // Not active: no-op.
    state.apply(&StoreEvent::JobLeaseRecovered { job_id: id.clone() });
    assert_eq!(state.jobs[&id].attempts, 0);

    state.apply(&StoreEvent::JobClaimed {
        job_id: id.clone(),
        lease_until_ms: 1,
        worker: "q-0".to_string(),
    });
    state.apply(&StoreEvent::JobLeaseRecovered { job_id: id.clone() });

    let job = &state.jobs[&id];
    assert_eq!(job.state, JobState::Waiting);
    assert_eq!(job.attempts, 1);
}
