// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Schema registry client.
//!
//! The registry's contract is minimal: resolve a schema by id. The caching
//! client keeps every resolved schema for the life of the process, so a
//! transiently unreachable registry only blocks records with ids never seen
//! before.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Registry unreachable; retryable, cached schemas remain usable.
    #[error("registry transport: {0}")]
    Transport(String),

    /// The id is not registered; permanent for the record carrying it.
    #[error("schema {0} not found")]
    NotFound(u32),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Transport(_))
    }
}

/// Scalar shape a schema field accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Str,
    Int,
    Float,
    Bool,
    Object,
    Array,
    Any,
}

impl FieldKind {
    fn matches(&self, value: &serde_json::Value) -> bool {
        match self {
            FieldKind::Str => value.is_string(),
            FieldKind::Int => value.is_i64() || value.is_u64(),
            FieldKind::Float => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Object => value.is_object(),
            FieldKind::Array => value.is_array(),
            FieldKind::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
    pub required: bool,
}

/// A registered binary schema, keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub id: u32,
    pub subject: String,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    /// Validate a decoded record body against this schema.
    pub fn validate(&self, data: &serde_json::Value) -> Result<(), String> {
        let object = data
            .as_object()
            .ok_or_else(|| format!("schema {}: data is not an object", self.subject))?;
        for field in &self.fields {
            match object.get(&field.name) {
                Some(value) if value.is_null() || field.kind.matches(value) => {}
                Some(value) => {
                    return Err(format!(
                        "schema {}: field '{}' has wrong shape (got {value})",
                        self.subject, field.name
                    ));
                }
                None if field.required => {
                    return Err(format!(
                        "schema {}: required field '{}' missing",
                        self.subject, field.name
                    ));
                }
                None => {}
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait SchemaRegistry: Send + Sync + 'static {
    async fn fetch(&self, id: u32) -> Result<Schema, RegistryError>;
}

/// Cache-first schema resolution.
pub struct CachingSchemaClient<R> {
    inner: Arc<R>,
    cache: Mutex<HashMap<u32, Arc<Schema>>>,
}

impl<R: SchemaRegistry> CachingSchemaClient<R> {
    pub fn new(inner: Arc<R>) -> Self {
        Self { inner, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn resolve(&self, id: u32) -> Result<Arc<Schema>, RegistryError> {
        if let Some(schema) = self.cache.lock().get(&id) {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(self.inner.fetch(id).await?);
        debug!(id, subject = schema.subject.as_str(), "schema resolved");
        self.cache.lock().insert(id, Arc::clone(&schema));
        Ok(schema)
    }

    /// Resolve a set of ids eagerly. Used at startup so a permanently
    /// unavailable registry fails fast instead of poisoning the first poll.
    pub async fn preload(&self, ids: &[u32]) -> Result<(), RegistryError> {
        for &id in ids {
            self.resolve(id).await?;
        }
        Ok(())
    }

    pub fn cached_count(&self) -> usize {
        self.cache.lock().len()
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryRegistry;

#[cfg(any(test, feature = "test-support"))]
mod in_memory {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// In-memory registry with an unavailability toggle.
    #[derive(Default)]
    pub struct InMemoryRegistry {
        schemas: Mutex<HashMap<u32, Schema>>,
        down: AtomicBool,
    }

    impl InMemoryRegistry {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn register(&self, schema: Schema) {
            self.schemas.lock().insert(schema.id, schema);
        }

        pub fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SchemaRegistry for InMemoryRegistry {
        async fn fetch(&self, id: u32) -> Result<Schema, RegistryError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(RegistryError::Transport("registry down".to_string()));
            }
            self.schemas.lock().get(&id).cloned().ok_or(RegistryError::NotFound(id))
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
