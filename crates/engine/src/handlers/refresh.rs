// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! `refresh_view`: run a pre-registered refresh statement and invalidate
//! dependent cache entries.
//!
//! Idempotent by construction: re-running a refresh only bumps the record
//! version again. Concurrent invocations are coalesced upstream by the
//! enqueue deduplication key (the view name).

use crate::error::HandlerError;
use crate::orchestrator::CacheOrchestrator;
use crate::registry::{JobContext, JobHandler};
use crate::handlers::seams::Warehouse;
use async_trait::async_trait;
use serde::Deserialize;
use sift_core::{fingerprint_prefix, Clock};
use sift_storage::{RefreshRecord, Store};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    view_name: String,
}

pub struct RefreshViewHandler<C: Clock> {
    store: Arc<Store>,
    warehouse: Arc<dyn Warehouse>,
    orchestrator: Arc<CacheOrchestrator<C>>,
    clock: C,
    /// `view_name` → refresh statement, registered at startup.
    statements: HashMap<String, String>,
    /// `view_name` → dependent query names whose fingerprints to invalidate.
    dependents: HashMap<String, Vec<String>>,
}

impl<C: Clock> RefreshViewHandler<C> {
    pub fn new(
        store: Arc<Store>,
        warehouse: Arc<dyn Warehouse>,
        orchestrator: Arc<CacheOrchestrator<C>>,
        clock: C,
        statements: HashMap<String, String>,
        dependents: HashMap<String, Vec<String>>,
    ) -> Self {
        Self { store, warehouse, orchestrator, clock, statements, dependents }
    }
}

#[async_trait]
impl<C: Clock> JobHandler for RefreshViewHandler<C> {
    async fn run(
        &self,
        payload: serde_json::Value,
        _ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError> {
        let RefreshPayload { view_name } = serde_json::from_value(payload)
            .map_err(|e| HandlerError::Permanent(format!("bad refresh payload: {e}")))?;

        let statement = self
            .statements
            .get(&view_name)
            .ok_or_else(|| {
                HandlerError::Permanent(format!("no refresh registered for view '{view_name}'"))
            })?
            .clone();

        let started_ms = self.clock.epoch_ms();
        let previous = self.store.refresh_record(&view_name);

        match self.warehouse.execute(&statement).await {
            Ok(_rows) => {}
            Err(e) => {
                let record = RefreshRecord {
                    view_name: view_name.clone(),
                    last_refreshed_at_ms: previous
                        .as_ref()
                        .map(|r| r.last_refreshed_at_ms)
                        .unwrap_or_default(),
                    last_success_duration_ms: previous
                        .as_ref()
                        .map(|r| r.last_success_duration_ms)
                        .unwrap_or_default(),
                    last_error: Some(e.to_string()),
                    version: previous.map(|r| r.version).unwrap_or_default(),
                };
                self.store.record_refresh(record).map_err(HandlerError::from)?;
                return Err(HandlerError::from(e));
            }
        }

        let duration_ms = self.clock.epoch_ms().saturating_sub(started_ms);
        let version = previous.map(|r| r.version).unwrap_or_default() + 1;
        let record = RefreshRecord {
            view_name: view_name.clone(),
            last_refreshed_at_ms: self.clock.epoch_ms(),
            last_success_duration_ms: duration_ms,
            last_error: None,
            version,
        };
        self.store.record_refresh(record).map_err(HandlerError::from)?;

        let mut invalidated = 0;
        for query in self.dependents.get(&view_name).into_iter().flatten() {
            invalidated += self.orchestrator.invalidate(&fingerprint_prefix(query));
        }
        info!(view = %view_name, duration_ms, version, invalidated, "view refreshed");

        Ok(serde_json::json!({
            "view_name": view_name,
            "duration_ms": duration_ms,
            "version": version,
            "invalidated": invalidated,
        }))
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
