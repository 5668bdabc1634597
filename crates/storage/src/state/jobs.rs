// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Job table apply handlers.

use super::StoreState;
use crate::event::StoreEvent;
use sift_core::job::JobState;

pub(crate) fn apply(state: &mut StoreState, event: &StoreEvent) {
    match event {
        StoreEvent::JobEnqueued { job } => {
            // Idempotency: skip if the job already exists.
            if state.jobs.contains_key(&job.id) {
                return;
            }
            let mut job = job.clone();
            job.seq = state.next_job_seq;
            state.next_job_seq += 1;
            if let Some(key) = &job.deduplication_key {
                state.dedup_index.insert((job.queue.clone(), key.clone()), job.id.clone());
            }
            state.jobs.insert(job.id.clone(), job);
        }

        StoreEvent::JobClaimed { job_id, lease_until_ms, worker: _ } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.state = JobState::Active;
                job.lease_until_ms = Some(*lease_until_ms);
            }
        }

        StoreEvent::JobLeaseExtended { job_id, lease_until_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.state == JobState::Active {
                    job.lease_until_ms = Some(*lease_until_ms);
                }
            }
        }

        StoreEvent::JobCompleted { job_id, result } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.state = JobState::Completed;
                job.lease_until_ms = None;
                job.result = Some(result.clone());
            }
            clear_dedup(state, job_id);
        }

        StoreEvent::JobRetried { job_id, error, next_available_at_ms } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                // Idempotency: only count the attempt on the state transition.
                if job.state == JobState::Active {
                    job.attempts += 1;
                }
                job.state = JobState::Waiting;
                job.lease_until_ms = None;
                job.last_error = Some(error.clone());
                job.available_at_ms = *next_available_at_ms;
            }
        }

        StoreEvent::JobDead { job_id, error } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.state == JobState::Active {
                    job.attempts += 1;
                }
                job.state = JobState::Dead;
                job.lease_until_ms = None;
                job.last_error = Some(error.clone());
            }
            clear_dedup(state, job_id);
        }

        StoreEvent::JobCancelled { job_id } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                job.state = JobState::Cancelled;
                job.lease_until_ms = None;
            }
            clear_dedup(state, job_id);
        }

        StoreEvent::JobLeaseRecovered { job_id } => {
            if let Some(job) = state.jobs.get_mut(job_id) {
                if job.state == JobState::Active {
                    job.attempts += 1;
                    job.state = JobState::Waiting;
                    job.lease_until_ms = None;
                }
            }
        }

        _ => {}
    }
}

fn clear_dedup(state: &mut StoreState, job_id: &sift_core::job::JobId) {
    if let Some(job) = state.jobs.get(job_id) {
        if let Some(key) = &job.deduplication_key {
            let index_key = (job.queue.clone(), key.clone());
            if state.dedup_index.get(&index_key) == Some(job_id) {
                state.dedup_index.remove(&index_key);
            }
        }
    }
}
