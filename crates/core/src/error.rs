// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Error taxonomy shared across the ingestion and job subsystems.
//!
//! Every failure that crosses a component boundary is classified into one
//! of the [`ErrorKind`] semantics. Retryable kinds flow through the queue's
//! backoff; permanent kinds are recorded and never retried automatically.

use crate::tenant::TenantId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure semantics, by behavior rather than by source type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid at startup; fatal.
    Config,
    /// Network to log/store/cache/registry; retryable with backoff.
    Transport,
    /// Record fails schema; permanent for that record.
    Schema,
    /// Idempotency hit; not an error to callers, recorded as `skipped`.
    DuplicateEvent,
    /// Deadlock, contention, timeout; retryable bounded by attempt policy.
    TransientStorage,
    /// Handler signaled a non-retryable failure.
    PermanentHandler,
    /// Operation lost its lease or deadline; the job returns to waiting.
    DeadlineExceeded,
    /// Job exceeded `max_attempts`; dead-lettered.
    PoisonJob,
}

impl ErrorKind {
    /// Whether a failure of this kind may be retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Transport | ErrorKind::TransientStorage | ErrorKind::DeadlineExceeded
        )
    }
}

crate::label_enum! {
    ErrorKind {
        Config => "config",
        Transport => "transport",
        Schema => "schema",
        DuplicateEvent => "duplicate_event",
        TransientStorage => "transient_storage",
        PermanentHandler => "permanent_handler",
        DeadlineExceeded => "deadline_exceeded",
        PoisonJob => "poison_job",
    }
}

/// Classified error carried across component boundaries.
///
/// Serializable so it can ride in event-log rows, job `last_error` fields,
/// and dead-letter records.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), correlation_id: None, tenant_id: None }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, message)
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema, message)
    }

    pub fn transient_storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientStorage, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermanentHandler, message)
    }

    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeadlineExceeded, message)
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<TenantId>) -> Self {
        self.tenant_id = Some(tenant.into());
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
