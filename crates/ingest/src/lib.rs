// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sift-ingest: stream consumption and idempotent event landing.
//!
//! The consumer owns partitions of the CRM change log, decodes records
//! (registry-framed binary or tagged JSON), and drives them in per-partition
//! order through the ingestion handler, committing offsets only after
//! durable acceptance. Duplicates after a crash are absorbed by the store's
//! idempotency invariant, never by consumer-side bookkeeping.

pub mod consumer;
pub mod decode;
pub mod ingestion;
pub mod registry;
pub mod transport;

pub use consumer::{ConsumerConfig, ConsumerHandle, ReplayControl, StreamConsumer};
pub use decode::{decode_record, DecodeError, WIRE_FORMAT_MAGIC};
pub use ingestion::{IngestionConfig, IngestionHandler};
pub use registry::{
    CachingSchemaClient, FieldKind, RegistryError, Schema, SchemaField, SchemaRegistry,
};
pub use transport::{LogRecord, LogTransport, TopicPartition, TransportError};

#[cfg(any(test, feature = "test-support"))]
pub use registry::InMemoryRegistry;
#[cfg(any(test, feature = "test-support"))]
pub use transport::InMemoryLog;
