// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use sift_core::FakeClock;
use std::time::Duration;

#[test]
fn get_respects_ttl() {
    let clock = FakeClock::at_epoch_ms(0);
    let cache = Cache::new(clock.clone());

    cache.put("k", b"value".to_vec(), 1_000);
    assert_eq!(cache.get("k"), Some(b"value".to_vec()));

    clock.advance(Duration::from_millis(999));
    assert!(cache.get("k").is_some());

    clock.advance(Duration::from_millis(1));
    assert!(cache.get("k").is_none());
}

#[test]
fn flight_marker_is_set_if_absent() {
    let clock = FakeClock::at_epoch_ms(0);
    let cache = Cache::new(clock.clone());

    assert!(cache.try_begin_flight("k", 1_000));
    assert!(!cache.try_begin_flight("k", 1_000));
    assert!(cache.flight_active("k"));

    cache.end_flight("k");
    assert!(cache.try_begin_flight("k", 1_000));
}

#[test]
fn expired_flight_marker_can_be_reacquired() {
    let clock = FakeClock::at_epoch_ms(0);
    let cache = Cache::new(clock.clone());

    assert!(cache.try_begin_flight("k", 500));
    clock.advance(Duration::from_millis(500));
    assert!(!cache.flight_active("k"));
    assert!(cache.try_begin_flight("k", 500));
}

#[test]
fn delete_prefix_spares_flights_and_other_keys() {
    let clock = FakeClock::at_epoch_ms(0);
    let cache = Cache::new(clock);

    cache.put("pipeline_kpis:acme:aa", b"1".to_vec(), 10_000);
    cache.put("pipeline_kpis:globex:bb", b"2".to_vec(), 10_000);
    cache.put("revenue:acme:cc", b"3".to_vec(), 10_000);
    assert!(cache.try_begin_flight("pipeline_kpis:acme:aa", 10_000));

    let removed = cache.delete_prefix("pipeline_kpis:");
    assert_eq!(removed, 2);
    assert!(cache.get("revenue:acme:cc").is_some());
    // The in-flight compute is allowed to finish.
    assert!(cache.flight_active("pipeline_kpis:acme:aa"));
}

#[test]
fn evict_expired_drops_stale_values_and_markers() {
    let clock = FakeClock::at_epoch_ms(0);
    let cache = Cache::new(clock.clone());

    cache.put("old", b"1".to_vec(), 100);
    cache.put("fresh", b"2".to_vec(), 10_000);
    cache.try_begin_flight("old-flight", 100);

    clock.advance(Duration::from_millis(200));
    assert_eq!(cache.evict_expired(), 1);
    assert!(cache.get("fresh").is_some());
    assert!(!cache.flight_active("old-flight"));
}
