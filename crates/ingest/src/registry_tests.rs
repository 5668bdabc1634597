// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use yare::parameterized;

fn schema() -> Schema {
    Schema {
        id: 7,
        subject: "crm.lead".to_string(),
        fields: vec![
            SchemaField { name: "name".to_string(), kind: FieldKind::Str, required: true },
            SchemaField { name: "score".to_string(), kind: FieldKind::Int, required: false },
        ],
    }
}

#[test]
fn validate_accepts_matching_object() {
    let result = schema().validate(&serde_json::json!({"name": "Jane", "score": 9}));
    assert!(result.is_ok());
}

#[test]
fn validate_accepts_missing_optional_and_null() {
    assert!(schema().validate(&serde_json::json!({"name": "Jane"})).is_ok());
    assert!(schema().validate(&serde_json::json!({"name": "Jane", "score": null})).is_ok());
}

#[parameterized(
    missing_required = { serde_json::json!({"score": 1}) },
    wrong_kind = { serde_json::json!({"name": 42}) },
    not_an_object = { serde_json::json!([1, 2]) },
)]
fn validate_rejects(data: serde_json::Value) {
    assert!(schema().validate(&data).is_err());
}

#[tokio::test]
async fn client_caches_after_first_fetch() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(schema());
    let client = CachingSchemaClient::new(Arc::clone(&registry));

    assert_eq!(client.resolve(7).await.unwrap().subject, "crm.lead");
    assert_eq!(client.cached_count(), 1);

    // Cached schemas survive registry unavailability.
    registry.set_down(true);
    assert!(client.resolve(7).await.is_ok());
    assert!(matches!(client.resolve(8).await, Err(RegistryError::Transport(_))));
}

#[tokio::test]
async fn unknown_schema_is_not_retryable() {
    let registry = Arc::new(InMemoryRegistry::new());
    let client = CachingSchemaClient::new(registry);

    let err = client.resolve(99).await.unwrap_err();
    assert_eq!(err, RegistryError::NotFound(99));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn preload_fails_fast_when_registry_down() {
    let registry = Arc::new(InMemoryRegistry::new());
    registry.register(schema());
    registry.set_down(true);
    let client = CachingSchemaClient::new(registry);

    assert!(client.preload(&[7]).await.is_err());
}
