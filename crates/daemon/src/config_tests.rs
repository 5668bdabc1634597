// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

use super::*;
use yare::parameterized;

#[test]
fn defaults_validate() {
    assert!(Config::default().validate().is_ok());
}

#[test]
fn full_config_parses() {
    let toml = r#"
        state_dir = "/tmp/sift-test"

        [log_transport]
        brokers = ["localhost:9092"]
        tls = true
        session_timeout_ms = 20000

        [ingestion]
        topics = ["crm.leads", "crm.opportunities"]
        group_id = "sift-main"
        partition_assignment = "eager"
        preload_schema_ids = [1, 2]
        [ingestion.schema_strategy]
        "crm.leads" = "registry"
        "crm.opportunities" = "json"

        [queue.refresh]
        concurrency = 4
        visibility_timeout_ms = 60000
        default_max_attempts = 5
        [queue.refresh.default_backoff]
        base_ms = 500
        max_ms = 30000
        jitter = false

        [scheduler]
        tick_interval_ms = 2000

        [cache]
        default_ttl_ms = 60000

        [retention]
        sweep_interval_ms = 1000
        [retention.window_days]
        lead = 90
        opportunity = 365

        [observability]
        log_level = "debug"
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    config.validate().unwrap();

    assert_eq!(config.ingestion.topics.len(), 2);
    assert_eq!(
        config.ingestion.schema_strategy["crm.leads"],
        SchemaStrategy::Registry
    );
    assert_eq!(config.queue["refresh"].concurrency, 4);
    assert!(!config.queue["refresh"].default_backoff.jitter);
    assert_eq!(config.retention.window_days["lead"], 90);
    assert_eq!(config.state_dir().unwrap(), PathBuf::from("/tmp/sift-test"));
}

#[test]
fn unknown_keys_are_rejected() {
    let toml = r#"
        [ingestion]
        topics = ["a"]
        group = "typo-for-group-id"
    "#;
    assert!(toml::from_str::<Config>(toml).is_err());
}

#[parameterized(
    empty_group = { r#"
        [ingestion]
        group_id = ""
    "# },
    bad_assignment = { r#"
        [ingestion]
        partition_assignment = "sticky"
    "# },
    zero_concurrency = { r#"
        [queue.q]
        concurrency = 0
    "# },
    zero_attempts = { r#"
        [queue.q]
        default_max_attempts = 0
    "# },
    inverted_backoff = { r#"
        [queue.q.default_backoff]
        base_ms = 1000
        max_ms = 10
    "# },
    unknown_kind = { r#"
        [retention.window_days]
        widget = 30
    "# },
)]
fn invalid_configs_fail_validation(toml: &str) {
    let config: Config = toml::from_str(toml).unwrap();
    assert!(config.validate().is_err());
}
