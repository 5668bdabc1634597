// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Explicit handler registration.
//!
//! Handlers are bound to `(queue, job_kind)` pairs during the startup phase;
//! the registry is frozen before any worker claims a job. An unknown
//! `job_kind` at run time is a permanent error, not a fallthrough.

use crate::error::HandlerError;
use async_trait::async_trait;
use sift_core::{Clock, JobId, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Extends the running job's lease during long work.
///
/// The engine wires the extension back to the store; contexts built by hand
/// in tests use [`LeaseExtender::noop`].
#[derive(Clone)]
pub struct LeaseExtender {
    inner: Option<Arc<dyn Fn() -> Result<u64, String> + Send + Sync>>,
}

impl LeaseExtender {
    pub fn noop() -> Self {
        Self { inner: None }
    }

    pub(crate) fn new(f: Arc<dyn Fn() -> Result<u64, String> + Send + Sync>) -> Self {
        Self { inner: Some(f) }
    }

    /// Push the lease out by another visibility timeout. Returns the new
    /// deadline in epoch ms (`None` for no-op extenders).
    pub fn extend(&self) -> Result<Option<u64>, String> {
        match &self.inner {
            Some(f) => f().map(Some),
            None => Ok(None),
        }
    }
}

/// Shared context passed to every handler invocation.
#[derive(Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub queue: String,
    /// 1-based attempt number of this run.
    pub attempt: u32,
    pub tenant_id: Option<TenantId>,
    pub correlation_id: Option<String>,
    /// Epoch ms when the current lease expires; the handler's deadline.
    pub deadline_ms: u64,
    /// Cancelled when the deadline passes or the engine drains. Handlers
    /// must honor it at their next suspension point.
    pub cancellation: CancellationToken,
    /// Lease extension hook for handlers doing long work.
    pub lease: LeaseExtender,
}

impl JobContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Milliseconds of budget left against the deadline.
    pub fn remaining_ms(&self, clock: &impl Clock) -> u64 {
        self.deadline_ms.saturating_sub(clock.epoch_ms())
    }
}

/// A job handler: `(payload, ctx) → result`.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(
        &self,
        payload: serde_json::Value,
        ctx: JobContext,
    ) -> Result<serde_json::Value, HandlerError>;
}

/// Startup-phase registry binding `(queue, job_kind)` to handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<(String, String), Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler. Re-registering the same pair replaces the binding;
    /// that only happens in tests.
    pub fn register(
        &mut self,
        queue: impl Into<String>,
        job_kind: impl Into<String>,
        handler: Arc<dyn JobHandler>,
    ) {
        self.handlers.insert((queue.into(), job_kind.into()), handler);
    }

    pub fn get(&self, queue: &str, job_kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&(queue.to_string(), job_kind.to_string())).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
