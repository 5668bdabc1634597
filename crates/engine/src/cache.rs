// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Keyed byte cache with TTL, atomic set-if-absent flight markers, and
//! prefix deletion.
//!
//! Values and flight markers are separate tables: `invalidate` removes
//! values but leaves markers, so an in-flight compute started before the
//! invalidation completes and caches its (soon to be recomputed) value.

use parking_lot::Mutex;
use sift_core::Clock;
use std::collections::HashMap;

/// Cache tuning knobs.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl_ms: u64,
    /// TTL of single-flight markers; bounds how long a crashed computer can
    /// block other callers.
    pub flight_ttl_ms: u64,
    /// Ceiling for the losers' exponential polling delay.
    pub poll_ceiling_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { default_ttl_ms: 300_000, flight_ttl_ms: 10_000, poll_ceiling_ms: 250 }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at_ms: u64,
}

/// In-process keyed byte store with TTL semantics.
pub struct Cache<C: Clock> {
    clock: C,
    values: Mutex<HashMap<String, Entry>>,
    flights: Mutex<HashMap<String, u64>>,
}

impl<C: Clock> Cache<C> {
    pub fn new(clock: C) -> Self {
        Self { clock, values: Mutex::new(HashMap::new()), flights: Mutex::new(HashMap::new()) }
    }

    /// Fresh value for `key`, if any. Expired entries are dropped lazily.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = self.clock.epoch_ms();
        let mut values = self.values.lock();
        match values.get(key) {
            Some(entry) if entry.expires_at_ms > now => Some(entry.value.clone()),
            Some(_) => {
                values.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, value: Vec<u8>, ttl_ms: u64) {
        let expires_at_ms = self.clock.epoch_ms() + ttl_ms;
        self.values.lock().insert(key.to_string(), Entry { value, expires_at_ms });
    }

    /// Atomic insert-if-absent of a flight marker. Returns `true` when this
    /// caller won the flight.
    pub fn try_begin_flight(&self, key: &str, ttl_ms: u64) -> bool {
        let now = self.clock.epoch_ms();
        let mut flights = self.flights.lock();
        match flights.get(key) {
            Some(&expires_at_ms) if expires_at_ms > now => false,
            _ => {
                flights.insert(key.to_string(), now + ttl_ms);
                true
            }
        }
    }

    /// Whether a live flight marker exists for `key`.
    pub fn flight_active(&self, key: &str) -> bool {
        let now = self.clock.epoch_ms();
        self.flights.lock().get(key).map(|&e| e > now).unwrap_or(false)
    }

    pub fn end_flight(&self, key: &str) {
        self.flights.lock().remove(key);
    }

    /// Delete every value whose key starts with `prefix`. Flight markers are
    /// intentionally untouched. Returns the number of removed values.
    pub fn delete_prefix(&self, prefix: &str) -> usize {
        let mut values = self.values.lock();
        let before = values.len();
        values.retain(|key, _| !key.starts_with(prefix));
        before - values.len()
    }

    /// Drop expired values and markers. Called opportunistically.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.epoch_ms();
        let mut removed = 0;
        {
            let mut values = self.values.lock();
            let before = values.len();
            values.retain(|_, entry| entry.expires_at_ms > now);
            removed += before - values.len();
        }
        {
            let mut flights = self.flights.lock();
            flights.retain(|_, &mut expires| expires > now);
        }
        removed
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
