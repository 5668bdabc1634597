// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Engine and handler error types.

use sift_core::{CoreError, ErrorKind};
use sift_storage::StoreError;
use thiserror::Error;

/// Failure returned by a job handler.
///
/// Exceptions-as-control-flow are not a thing here: handlers classify every
/// failure as transient (retry through the queue's backoff) or permanent
/// (straight to dead). Unclassified errors never escape a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("permanent: {0}")]
    Permanent(String),
}

impl HandlerError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, HandlerError::Permanent(_))
    }

    pub fn message(&self) -> &str {
        match self {
            HandlerError::Transient(msg) | HandlerError::Permanent(msg) => msg,
        }
    }
}

impl From<CoreError> for HandlerError {
    fn from(err: CoreError) -> Self {
        if err.is_retryable() {
            HandlerError::Transient(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        if err.is_transient() {
            HandlerError::Transient(err.to_string())
        } else {
            HandlerError::Permanent(err.to_string())
        }
    }
}

/// Engine-level failures (outside handler execution).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown queue '{0}'")]
    UnknownQueue(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Core(#[from] CoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::UnknownQueue(_) => ErrorKind::Config,
            EngineError::Store(e) if e.is_transient() => ErrorKind::TransientStorage,
            EngineError::Store(_) => ErrorKind::PermanentHandler,
            EngineError::Core(e) => e.kind,
        }
    }
}
