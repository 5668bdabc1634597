// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Lightweight counters shared across the subsystems.
//!
//! Detailed telemetry goes through `tracing`; these counters back the admin
//! surface's stats queries.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide operation counters. Cheap to share behind an `Arc`.
#[derive(Debug, Default)]
pub struct Metrics {
    events_processed: AtomicU64,
    events_skipped: AtomicU64,
    events_failed: AtomicU64,
    jobs_enqueued: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_retried: AtomicU64,
    jobs_dead: AtomicU64,
    schedules_fired: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    singleflight_waits: AtomicU64,
    partitions_paused: AtomicU64,
    partitions_halted: AtomicU64,
}

macro_rules! counter {
    ($($field:ident => $incr:ident),+ $(,)?) => {
        impl Metrics {
            $(
                pub fn $incr(&self) {
                    self.$field.fetch_add(1, Ordering::Relaxed);
                }
            )+

            /// Point-in-time copy of every counter.
            pub fn snapshot(&self) -> MetricsSnapshot {
                MetricsSnapshot {
                    $( $field: self.$field.load(Ordering::Relaxed), )+
                }
            }
        }

        /// Serializable snapshot of [`Metrics`] for the admin surface.
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct MetricsSnapshot {
            $( pub $field: u64, )+
        }
    };
}

counter! {
    events_processed => incr_events_processed,
    events_skipped => incr_events_skipped,
    events_failed => incr_events_failed,
    jobs_enqueued => incr_jobs_enqueued,
    jobs_completed => incr_jobs_completed,
    jobs_retried => incr_jobs_retried,
    jobs_dead => incr_jobs_dead,
    schedules_fired => incr_schedules_fired,
    cache_hits => incr_cache_hits,
    cache_misses => incr_cache_misses,
    singleflight_waits => incr_singleflight_waits,
    partitions_paused => incr_partitions_paused,
    partitions_halted => incr_partitions_halted,
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
