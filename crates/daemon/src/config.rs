// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Daemon configuration.
//!
//! A single validated value assembled once at startup from a TOML file plus
//! defaults. Every recognized option group is enumerated here; unknown keys
//! are rejected so typos fail fast instead of silently using defaults.

use serde::Deserialize;
use sift_core::BackoffPolicy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("could not determine state directory")]
    NoStateDir,
}

/// Connection settings for the partitioned log.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LogTransportConfig {
    pub brokers: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tls: bool,
    pub session_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_poll_wait_ms: u64,
}

impl Default for LogTransportConfig {
    fn default() -> Self {
        Self {
            brokers: Vec::new(),
            username: None,
            password: None,
            tls: false,
            session_timeout_ms: 30_000,
            heartbeat_interval_ms: 3_000,
            max_poll_wait_ms: 500,
        }
    }
}

/// Per-topic decode strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaStrategy {
    /// 5-byte framing with registry resolution; falls back to JSON when the
    /// magic byte is absent.
    Registry,
    /// Tagged JSON only.
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct IngestionConfigSection {
    pub topics: Vec<String>,
    pub group_id: String,
    /// "cooperative" or "eager"; forwarded to the transport.
    pub partition_assignment: String,
    pub schema_strategy: HashMap<String, SchemaStrategy>,
    /// Schema ids resolved eagerly at startup.
    pub preload_schema_ids: Vec<u32>,
    pub max_transient_retries: u32,
    pub max_inflight: usize,
    pub resume_low_water: usize,
}

impl Default for IngestionConfigSection {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            group_id: "sift-ingest".to_string(),
            partition_assignment: "cooperative".to_string(),
            schema_strategy: HashMap::new(),
            preload_schema_ids: Vec::new(),
            max_transient_retries: 3,
            max_inflight: 64,
            resume_low_water: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackoffSection {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter: bool,
}

impl Default for BackoffSection {
    fn default() -> Self {
        Self { base_ms: 1_000, max_ms: 60_000, jitter: true }
    }
}

impl From<BackoffSection> for BackoffPolicy {
    fn from(section: BackoffSection) -> Self {
        BackoffPolicy::new(section.base_ms, section.max_ms, section.jitter)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct QueueSection {
    pub concurrency: usize,
    pub visibility_timeout_ms: u64,
    pub default_max_attempts: u32,
    pub default_backoff: BackoffSection,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            concurrency: 2,
            visibility_timeout_ms: 30_000,
            default_max_attempts: 3,
            default_backoff: BackoffSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SchedulerSection {
    pub tick_interval_ms: u64,
    pub max_catchup_span_ms: u64,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self { tick_interval_ms: 1_000, max_catchup_span_ms: 24 * 60 * 60 * 1000 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CacheSection {
    pub default_ttl_ms: u64,
    pub flight_ttl_ms: u64,
    pub poll_ceiling_ms: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { default_ttl_ms: 300_000, flight_ttl_ms: 10_000, poll_ceiling_ms: 250 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetentionSection {
    /// Partition retention window per staging kind, in days.
    pub window_days: HashMap<String, u32>,
    pub sweep_interval_ms: u64,
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self { window_days: HashMap::new(), sweep_interval_ms: 60 * 60 * 1000 }
    }
}

/// Logging configuration. Counters are served in-process through the admin
/// surface; there is no HTTP metrics or trace endpoint to configure.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ObservabilitySection {
    pub log_level: String,
    pub log_file: Option<PathBuf>,
}

impl Default for ObservabilitySection {
    fn default() -> Self {
        Self { log_level: "info".to_string(), log_file: None }
    }
}

/// The complete daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Root state directory; defaults to `$XDG_STATE_HOME/sift`.
    pub state_dir: Option<PathBuf>,
    pub log_transport: LogTransportConfig,
    pub ingestion: IngestionConfigSection,
    pub queue: HashMap<String, QueueSection>,
    pub scheduler: SchedulerSection,
    pub cache: CacheSection,
    pub retention: RetentionSection,
    pub observability: ObservabilitySection,
}

impl Config {
    /// Load from a TOML file. A missing `path` of `None` yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ingestion.group_id.is_empty() {
            return Err(ConfigError::Invalid("ingestion.group_id must be non-empty".into()));
        }
        match self.ingestion.partition_assignment.as_str() {
            "cooperative" | "eager" => {}
            other => {
                return Err(ConfigError::Invalid(format!(
                    "ingestion.partition_assignment '{other}' is not one of cooperative|eager"
                )))
            }
        }
        for (name, queue) in &self.queue {
            if queue.concurrency == 0 {
                return Err(ConfigError::Invalid(format!(
                    "queue.{name}.concurrency must be at least 1"
                )));
            }
            if queue.default_max_attempts == 0 {
                return Err(ConfigError::Invalid(format!(
                    "queue.{name}.default_max_attempts must be at least 1"
                )));
            }
            if queue.default_backoff.base_ms > queue.default_backoff.max_ms {
                return Err(ConfigError::Invalid(format!(
                    "queue.{name}.default_backoff base exceeds max"
                )));
            }
        }
        for kind in self.retention.window_days.keys() {
            let known = sift_core::StagingKind::ALL.iter().any(|k| k.label() == kind.as_str());
            if !known {
                return Err(ConfigError::Invalid(format!(
                    "retention.window_days has unknown staging kind '{kind}'"
                )));
            }
        }
        Ok(())
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.state_dir {
            return Ok(dir.clone());
        }
        dirs::state_dir().map(|d| d.join("sift")).ok_or(ConfigError::NoStateDir)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
