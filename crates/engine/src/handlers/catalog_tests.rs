// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use crate::handlers::fakes::FakeConnectorSource;
use crate::handlers::seams::DiscoveredDataset;
use crate::registry::{JobContext, LeaseExtender};
use sift_core::{FakeClock, JobId};
use tokio_util::sync::CancellationToken;

fn ctx() -> JobContext {
    JobContext {
        job_id: JobId::new(),
        queue: "catalog".to_string(),
        attempt: 1,
        tenant_id: None,
        correlation_id: None,
        deadline_ms: u64::MAX,
        cancellation: CancellationToken::new(),
        lease: LeaseExtender::noop(),
    }
}

fn dataset(id: &str, schema: &str, table: &str) -> DiscoveredDataset {
    DiscoveredDataset {
        id: id.to_string(),
        schema_name: schema.to_string(),
        table_name: table.to_string(),
        row_count: Some(100),
    }
}

#[tokio::test]
async fn discovery_upserts_datasets_and_lineage() {
    let store = Arc::new(Store::in_memory());
    let source = Arc::new(FakeConnectorSource::new());
    source.add_dataset("conn-1", dataset("ds-1", "public", "leads"));
    source.add_dataset("conn-1", dataset("ds-2", "public", "contacts"));

    let handler = CatalogDiscoveryHandler::new(
        Arc::clone(&store),
        Arc::clone(&source) as Arc<dyn ConnectorSource>,
        FakeClock::at_epoch_ms(9_000),
    );
    let result = handler
        .run(serde_json::json!({"connector_id": "conn-1"}), ctx())
        .await
        .unwrap();
    assert_eq!(result["discovered"], 2);

    store.read(|state| {
        assert_eq!(state.datasets.len(), 2);
        assert_eq!(state.datasets["ds-1"].connector_id, "conn-1");
        assert_eq!(state.datasets["ds-1"].discovered_at_ms, 9_000);
        assert_eq!(state.lineage.len(), 2);
        assert_eq!(state.lineage[0].kind, "contains");
    });
}

#[tokio::test]
async fn discovery_applies_schema_and_table_filters() {
    let store = Arc::new(Store::in_memory());
    let source = Arc::new(FakeConnectorSource::new());
    source.add_dataset("conn-1", dataset("ds-1", "public", "leads"));
    source.add_dataset("conn-1", dataset("ds-2", "internal", "leads_raw"));

    let handler =
        CatalogDiscoveryHandler::new(Arc::clone(&store), source, FakeClock::at_epoch_ms(0));
    let result = handler
        .run(
            serde_json::json!({
                "connector_id": "conn-1",
                "schema_filter": "public",
                "table_pattern": "lead",
            }),
            ctx(),
        )
        .await
        .unwrap();
    assert_eq!(result["discovered"], 1);
}

#[tokio::test]
async fn profile_computes_column_statistics() {
    let store = Arc::new(Store::in_memory());
    let source = Arc::new(FakeConnectorSource::new());
    source.set_sample(
        "ds-1",
        vec![
            ColumnSample {
                name: "email".to_string(),
                data_type: "text".to_string(),
                values: vec![
                    serde_json::json!("a@x.com"),
                    serde_json::json!("b@x.com"),
                    serde_json::Value::Null,
                    serde_json::json!("a@x.com"),
                ],
            },
            ColumnSample {
                name: "score".to_string(),
                data_type: "int".to_string(),
                values: vec![serde_json::json!(1), serde_json::json!(2), serde_json::json!(2)],
            },
        ],
    );

    let handler =
        CatalogProfileHandler::new(Arc::clone(&store), source, FakeClock::at_epoch_ms(7_000));
    let result = handler
        .run(
            serde_json::json!({"dataset_ids": ["ds-1"], "include_pii_detection": true}),
            ctx(),
        )
        .await
        .unwrap();
    assert_eq!(result["profiled_columns"], 2);
    assert_eq!(result["failed"], 0);

    store.read(|state| {
        let email = &state.column_profiles["ds-1::email"];
        assert_eq!(email.null_fraction, 0.25);
        assert_eq!(email.distinct_count, 2);
        assert_eq!(email.pii_kind.as_deref(), Some("email"));

        let score = &state.column_profiles["ds-1::score"];
        assert_eq!(score.null_fraction, 0.0);
        assert_eq!(score.distinct_count, 2);
        assert!(score.pii_kind.is_none());
    });
}

#[tokio::test]
async fn profile_without_pii_flag_skips_classification() {
    let store = Arc::new(Store::in_memory());
    let source = Arc::new(FakeConnectorSource::new());
    source.set_sample(
        "ds-1",
        vec![ColumnSample {
            name: "email".to_string(),
            data_type: "text".to_string(),
            values: vec![serde_json::json!("a@x.com")],
        }],
    );

    let handler =
        CatalogProfileHandler::new(Arc::clone(&store), source, FakeClock::at_epoch_ms(0));
    handler
        .run(serde_json::json!({"dataset_ids": ["ds-1"]}), ctx())
        .await
        .unwrap();

    store.read(|state| {
        let email = &state.column_profiles["ds-1::email"];
        assert!(email.pii_kind.is_none());
    });
}

#[tokio::test]
async fn one_failing_dataset_does_not_abort_others() {
    let store = Arc::new(Store::in_memory());
    let source = Arc::new(FakeConnectorSource::new());
    source.fail_sampling("ds-bad");
    source.set_sample(
        "ds-good",
        vec![ColumnSample {
            name: "name".to_string(),
            data_type: "text".to_string(),
            values: vec![serde_json::json!("x")],
        }],
    );

    let handler =
        CatalogProfileHandler::new(Arc::clone(&store), source, FakeClock::at_epoch_ms(0));
    let result = handler
        .run(
            serde_json::json!({"dataset_ids": ["ds-bad", "ds-good"], "include_pii_detection": false}),
            ctx(),
        )
        .await
        .unwrap();
    assert_eq!(result["profiled_columns"], 1);
    assert_eq!(result["failed"], 1);
}

#[test]
fn pii_detection_by_value_shape() {
    let emails: Vec<serde_json::Value> =
        vec![serde_json::json!("a@x.com"), serde_json::json!("b@y.org")];
    assert_eq!(detect_pii("contact_field", &emails), Some("email".to_string()));

    let plain: Vec<serde_json::Value> = vec![serde_json::json!("hello"), serde_json::json!("x")];
    assert_eq!(detect_pii("notes", &plain), None);

    assert_eq!(detect_pii("billing_phone", &[]), Some("phone".to_string()));
    assert_eq!(detect_pii("ssn_last4", &[]), Some("national_id".to_string()));
}
