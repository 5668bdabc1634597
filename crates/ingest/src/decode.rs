// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Record decoding.
//!
//! A payload starting with the `0x00` magic byte carries a 5-byte framing
//! header: `{0x00, schema_id: u32 big-endian}` followed by the body, which
//! is validated against the registry schema. Anything else is interpreted
//! as UTF-8 JSON. Everything except registry unavailability is a permanent
//! error for the record.

use crate::registry::{CachingSchemaClient, RegistryError, SchemaRegistry};
use crate::transport::LogRecord;
use sift_core::EventEnvelope;
use thiserror::Error;

/// First byte of a registry-framed payload.
pub const WIRE_FORMAT_MAGIC: u8 = 0x00;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("framing: {0}")]
    Framing(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("schema validation: {0}")]
    Validation(String),

    #[error("envelope: {0}")]
    Envelope(String),
}

impl DecodeError {
    /// Only registry transport failures are worth retrying; every other
    /// decode failure is permanent for the record.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DecodeError::Registry(e) if e.is_retryable())
    }
}

/// Decode one log record into an event envelope.
pub async fn decode_record<R: SchemaRegistry>(
    record: &LogRecord,
    registry: &CachingSchemaClient<R>,
) -> Result<EventEnvelope, DecodeError> {
    if record.payload.first() == Some(&WIRE_FORMAT_MAGIC) {
        if record.payload.len() < 5 {
            return Err(DecodeError::Framing(format!(
                "framed payload of {} bytes is shorter than the 5-byte header",
                record.payload.len()
            )));
        }
        let schema_id = u32::from_be_bytes([
            record.payload[1],
            record.payload[2],
            record.payload[3],
            record.payload[4],
        ]);
        let schema = registry.resolve(schema_id).await?;
        let envelope = parse_envelope(&record.payload[5..])?;
        schema.validate(&envelope.data).map_err(DecodeError::Validation)?;
        Ok(envelope)
    } else {
        parse_envelope(&record.payload)
    }
}

fn parse_envelope(bytes: &[u8]) -> Result<EventEnvelope, DecodeError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DecodeError::Envelope(format!("payload is not utf-8: {e}")))?;
    serde_json::from_str(text).map_err(|e| DecodeError::Envelope(format!("bad envelope: {e}")))
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
