// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;

#[test]
fn counters_start_at_zero() {
    let metrics = Metrics::default();
    assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
}

#[test]
fn increments_show_in_snapshot() {
    let metrics = Metrics::default();
    metrics.incr_events_processed();
    metrics.incr_events_processed();
    metrics.incr_jobs_dead();

    let snap = metrics.snapshot();
    assert_eq!(snap.events_processed, 2);
    assert_eq!(snap.jobs_dead, 1);
    assert_eq!(snap.cache_hits, 0);
}
