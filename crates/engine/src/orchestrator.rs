// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Single-flight orchestration over the cache.
//!
//! For a given fingerprint, at most one producer runs at a time. Losers poll
//! with exponentially growing delays (up to the configured ceiling) until
//! the winner publishes, the marker lapses, or their own attempt wins the
//! next acquisition round.

use crate::cache::{Cache, CacheConfig};
use sift_core::{Clock, CoreError, Metrics};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct CacheOrchestrator<C: Clock> {
    cache: Arc<Cache<C>>,
    config: CacheConfig,
    metrics: Arc<Metrics>,
}

impl<C: Clock> CacheOrchestrator<C> {
    pub fn new(cache: Arc<Cache<C>>, config: CacheConfig, metrics: Arc<Metrics>) -> Self {
        Self { cache, config, metrics }
    }

    pub fn cache(&self) -> &Arc<Cache<C>> {
        &self.cache
    }

    /// Serve `key` from cache, or compute it with at most one concurrent
    /// producer. Every caller observes either the prior cached value or the
    /// value of the in-flight computation.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &str,
        ttl_ms: u64,
        producer: F,
    ) -> Result<Vec<u8>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CoreError>>,
    {
        if let Some(value) = self.cache.get(key) {
            self.metrics.incr_cache_hits();
            return Ok(value);
        }
        self.metrics.incr_cache_misses();

        let mut producer = Some(producer);
        loop {
            if self.cache.try_begin_flight(key, self.config.flight_ttl_ms) {
                // Won the flight. A caller runs its producer at most once:
                // the winner returns directly after, so the take() cannot
                // miss here.
                let producer = match producer.take() {
                    Some(p) => p,
                    None => {
                        self.cache.end_flight(key);
                        return Err(CoreError::transient_storage(format!(
                            "single-flight producer for '{key}' already consumed"
                        )));
                    }
                };
                let result = producer().await;
                match result {
                    Ok(value) => {
                        self.cache.put(key, value.clone(), ttl_ms);
                        self.cache.end_flight(key);
                        return Ok(value);
                    }
                    Err(e) => {
                        self.cache.end_flight(key);
                        return Err(e);
                    }
                }
            }

            // Lost the flight: poll for the winner's value.
            self.metrics.incr_singleflight_waits();
            debug!(key, "waiting on in-flight computation");
            let mut delay_ms: u64 = 2;
            loop {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                if let Some(value) = self.cache.get(key) {
                    return Ok(value);
                }
                if !self.cache.flight_active(key) {
                    // Winner finished without a value (failure) or its
                    // marker expired: go around and try to acquire.
                    break;
                }
                delay_ms = (delay_ms * 2).min(self.config.poll_ceiling_ms);
            }
        }
    }

    /// Bulk-invalidate values by key prefix. In-flight computations are left
    /// to complete; the next access recomputes.
    pub fn invalidate(&self, prefix: &str) -> usize {
        let removed = self.cache.delete_prefix(prefix);
        debug!(prefix, removed, "cache invalidated");
        removed
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
