// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Ingestion outcome and event-log status enumerations.

use serde::{Deserialize, Serialize};

/// Result of offering one event to the ingestion handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// Staging row and log entry committed.
    Processed,
    /// Idempotency hit; a `skipped` log entry was recorded.
    SkippedDuplicate,
    /// Storage hiccup; the caller must retry and must not commit the offset.
    FailedTransient,
    /// Unrecoverable for this record; logged as `failed`, offset advances.
    FailedPermanent,
}

impl IngestOutcome {
    /// Whether the consumer may commit the offset past this record.
    pub fn advances_offset(&self) -> bool {
        !matches!(self, IngestOutcome::FailedTransient)
    }
}

crate::label_enum! {
    IngestOutcome {
        Processed => "processed",
        SkippedDuplicate => "skipped_duplicate",
        FailedTransient => "failed_transient",
        FailedPermanent => "failed_permanent",
    }
}

/// Processing status recorded on event-log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Processed,
    Skipped,
    Failed,
}

crate::label_enum! {
    ProcessingStatus {
        Processed => "processed",
        Skipped => "skipped",
        Failed => "failed",
    }
}
