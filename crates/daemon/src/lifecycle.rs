// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Daemon lifecycle: startup, drain, shutdown.
//!
//! Startup constructs every component with explicit configuration and
//! registers all handlers before any worker claims a job. Shutdown stops
//! claims, drains workers within the grace period, stops the consumer,
//! checkpoints the store, and releases the lock file.

use crate::adapters::{FileLog, FileRegistry, FsBlobStore, LoggingWarehouse, UnconfiguredConnectors};
use crate::config::Config;
use fs2::FileExt;
use parking_lot::Mutex;
use sift_core::envelope::StagingKind;
use sift_core::{Metrics, SystemClock};
use sift_engine::handlers::{
    AlertChannel, AlertEvaluateHandler, AlertRule, CatalogDiscoveryHandler, CatalogProfileHandler,
    ConnectorSource, CrmIngestOffsetHandler, ExportRenderHandler, ExportSpec, RefreshViewHandler,
    ReportGenerateHandler, ReportSpec, Warehouse,
};
use sift_engine::{
    Cache, CacheConfig, CacheOrchestrator, HandlerRegistry, Janitor, QueueConfig, QueueEngine,
    Scheduler, SchedulerConfig, WorkerPool,
};
use sift_ingest::{
    CachingSchemaClient, ConsumerConfig, ConsumerHandle, IngestionConfig, IngestionHandler,
    ReplayControl, StreamConsumer,
};
use sift_storage::Store;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Startup failures, mapped to the binary's exit codes.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("schema registry: {0}")]
    Registry(String),
}

impl StartupError {
    /// 1 config, 2 storage, 3 schema registry.
    pub fn exit_code(&self) -> i32 {
        match self {
            StartupError::Config(_) => 1,
            StartupError::Storage(_) => 2,
            StartupError::Registry(_) => 3,
        }
    }
}

/// Collaborators and registered definitions handed to startup.
///
/// The surrounding platform (model authorship, dashboards, connectors)
/// provides the real content; the standalone daemon defaults to local
/// adapters and empty registrations.
pub struct Collaborators {
    pub warehouse: Arc<dyn Warehouse>,
    pub connectors: Arc<dyn ConnectorSource>,
    pub channels: HashMap<String, Arc<dyn AlertChannel>>,
    pub refresh_statements: HashMap<String, String>,
    pub refresh_dependents: HashMap<String, Vec<String>>,
    pub exports: HashMap<String, ExportSpec>,
    pub alerts: HashMap<String, AlertRule>,
    pub reports: HashMap<String, ReportSpec>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            warehouse: Arc::new(LoggingWarehouse),
            connectors: Arc::new(UnconfiguredConnectors),
            channels: HashMap::new(),
            refresh_statements: HashMap::new(),
            refresh_dependents: HashMap::new(),
            exports: HashMap::new(),
            alerts: HashMap::new(),
            reports: HashMap::new(),
        }
    }
}

type DaemonConsumer = StreamConsumer<FileLog, FileRegistry, SystemClock>;

/// The lifecycle container. Everything the process owns hangs off this.
pub struct Daemon {
    pub config: Config,
    pub store: Arc<Store>,
    pub metrics: Arc<Metrics>,
    pub engine: Arc<QueueEngine<SystemClock>>,
    pub orchestrator: Arc<CacheOrchestrator<SystemClock>>,
    pub scheduler: Arc<Scheduler<SystemClock>>,
    pub(crate) consumer: Arc<DaemonConsumer>,
    pub(crate) consumer_handle: Mutex<Option<ConsumerHandle>>,
    shutdown: CancellationToken,
    workers: Mutex<Option<WorkerPool>>,
    background: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    // NOTE(lifetime): held to keep the exclusive daemon lock; released on drop
    #[allow(dead_code)]
    lock_file: File,
}

impl fmt::Debug for Daemon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Build and start every component.
    pub async fn start(config: Config, collaborators: Collaborators) -> Result<Arc<Self>, StartupError> {
        let state_dir = config.state_dir().map_err(|e| StartupError::Config(e.to_string()))?;
        std::fs::create_dir_all(&state_dir)
            .map_err(|e| StartupError::Storage(format!("state dir: {e}")))?;

        let lock_file = File::create(state_dir.join("daemon.lock"))
            .map_err(|e| StartupError::Storage(format!("lock file: {e}")))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| StartupError::Config("daemon already running?".to_string()))?;

        let clock = SystemClock;
        let metrics = Arc::new(Metrics::default());
        let store = Arc::new(
            Store::open(&state_dir.join("store"))
                .map_err(|e| StartupError::Storage(e.to_string()))?,
        );

        let cache = Arc::new(Cache::new(clock.clone()));
        let cache_config = CacheConfig {
            default_ttl_ms: config.cache.default_ttl_ms,
            flight_ttl_ms: config.cache.flight_ttl_ms,
            poll_ceiling_ms: config.cache.poll_ceiling_ms,
        };
        let orchestrator = Arc::new(CacheOrchestrator::new(
            Arc::clone(&cache),
            cache_config,
            Arc::clone(&metrics),
        ));

        // Schema registry: permanent unavailability blocks startup.
        let registry = FileRegistry::load(&state_dir.join("schemas.json"))
            .map_err(|e| StartupError::Registry(e.to_string()))?;
        let schema_client = Arc::new(CachingSchemaClient::new(Arc::new(registry)));
        schema_client
            .preload(&config.ingestion.preload_schema_ids)
            .await
            .map_err(|e| StartupError::Registry(e.to_string()))?;

        let transport = Arc::new(FileLog::new(state_dir.join("log")));
        let ingestion_handler = Arc::new(IngestionHandler::new(
            Arc::clone(&store),
            clock.clone(),
            Arc::clone(&metrics),
            IngestionConfig {
                max_transient_retries: config.ingestion.max_transient_retries,
                max_inflight: config.ingestion.max_inflight,
                resume_low_water: config.ingestion.resume_low_water,
                ..IngestionConfig::default()
            },
        ));
        let consumer = StreamConsumer::new(
            transport,
            schema_client,
            ingestion_handler,
            Arc::clone(&metrics),
            ConsumerConfig {
                topics: config.ingestion.topics.clone(),
                group_id: config.ingestion.group_id.clone(),
                poll_interval_ms: config.log_transport.max_poll_wait_ms,
                ..ConsumerConfig::default()
            },
        );
        // Partition halts page through the same channels as triggered alerts.
        for channel in collaborators.channels.values() {
            consumer.add_fatal_alert_channel(Arc::clone(channel));
        }

        // Handler registration: every (queue, kind) binding happens here,
        // before any worker starts.
        let mut registry = HandlerRegistry::new();
        let replay_control = Arc::new(ReplayControl::new(Arc::clone(&consumer)));
        register_handlers(
            &mut registry,
            &store,
            &state_dir,
            &clock,
            &orchestrator,
            &collaborators,
            replay_control,
        );

        let queues: HashMap<String, QueueConfig> = config
            .queue
            .iter()
            .map(|(name, section)| {
                (
                    name.clone(),
                    QueueConfig {
                        concurrency: section.concurrency,
                        visibility_timeout_ms: section.visibility_timeout_ms,
                        default_max_attempts: section.default_max_attempts,
                        default_backoff: section.default_backoff.clone().into(),
                        poll_interval_ms: 50,
                    },
                )
            })
            .collect();

        let engine = Arc::new(QueueEngine::new(
            Arc::clone(&store),
            clock.clone(),
            Arc::clone(&metrics),
            registry,
            queues,
        ));
        let scheduler = Arc::new(Scheduler::new(
            &engine,
            SchedulerConfig {
                tick_interval_ms: config.scheduler.tick_interval_ms,
                max_catchup_span_ms: config.scheduler.max_catchup_span_ms,
            },
        ));

        let shutdown = CancellationToken::new();
        let workers = WorkerPool::spawn(Arc::clone(&engine), shutdown.child_token());

        let mut background = Vec::new();
        let janitor = Janitor::new(&engine, Duration::from_millis(1_000));
        background.push(tokio::spawn(janitor.run(shutdown.child_token())));

        let scheduler_task = Scheduler::new(
            &engine,
            SchedulerConfig {
                tick_interval_ms: config.scheduler.tick_interval_ms,
                max_catchup_span_ms: config.scheduler.max_catchup_span_ms,
            },
        );
        background.push(tokio::spawn(scheduler_task.run(shutdown.child_token())));

        background.push(tokio::spawn(retention_loop(
            Arc::clone(&store),
            config.clone(),
            shutdown.child_token(),
        )));

        let daemon = Arc::new(Self {
            config,
            store,
            metrics,
            engine,
            orchestrator,
            scheduler,
            consumer,
            consumer_handle: Mutex::new(None),
            shutdown,
            workers: Mutex::new(Some(workers)),
            background: Mutex::new(background),
            lock_file,
        });

        if !daemon.config.ingestion.topics.is_empty() {
            daemon.start_ingestion().await.map_err(|e| match e.kind {
                sift_core::ErrorKind::Config => StartupError::Config(e.to_string()),
                _ => StartupError::Storage(e.to_string()),
            })?;
        }

        info!("daemon started");
        Ok(daemon)
    }

    /// Start (or restart) stream consumption.
    pub async fn start_ingestion(&self) -> Result<(), sift_core::CoreError> {
        if self.consumer_handle.lock().is_some() {
            return Ok(());
        }
        let handle = self.consumer.start().await?;
        let racing = {
            let mut guard = self.consumer_handle.lock();
            if guard.is_none() {
                *guard = Some(handle);
                info!("ingestion started");
                None
            } else {
                // Lost a concurrent start; tear the duplicate down.
                Some(handle)
            }
        };
        if let Some(handle) = racing {
            handle.stop().await;
        }
        Ok(())
    }

    /// Stop stream consumption, draining in-flight records.
    pub async fn stop_ingestion(&self) {
        let handle = self.consumer_handle.lock().take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("ingestion stopped");
        }
    }

    /// Drain and shut everything down: no new claims, workers finish their
    /// current job, the consumer commits durable offsets, the store
    /// checkpoints.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.stop_ingestion().await;
        self.shutdown.cancel();

        if let Some(workers) = self.workers.lock().take() {
            workers.drain().await;
        }
        let background = std::mem::take(&mut *self.background.lock());
        for task in background {
            let _ = task.await;
        }

        if let Err(e) = self.store.checkpoint() {
            warn!(error = %e, "shutdown checkpoint failed");
        }
        info!("daemon stopped");
    }
}

fn register_handlers(
    registry: &mut HandlerRegistry,
    store: &Arc<Store>,
    state_dir: &std::path::Path,
    clock: &SystemClock,
    orchestrator: &Arc<CacheOrchestrator<SystemClock>>,
    collaborators: &Collaborators,
    replay_control: Arc<ReplayControl<FileLog, FileRegistry, SystemClock>>,
) {
    let blobs: Arc<dyn sift_engine::handlers::BlobStore> =
        Arc::new(FsBlobStore::new(state_dir.join("blobs"), "sift-local-signing"));

    registry.register(
        "refresh",
        "refresh_view",
        Arc::new(RefreshViewHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.warehouse),
            Arc::clone(orchestrator),
            clock.clone(),
            collaborators.refresh_statements.clone(),
            collaborators.refresh_dependents.clone(),
        )),
    );
    registry.register(
        "catalog",
        "catalog_discovery",
        Arc::new(CatalogDiscoveryHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.connectors),
            clock.clone(),
        )),
    );
    registry.register(
        "catalog",
        "catalog_profile",
        Arc::new(CatalogProfileHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.connectors),
            clock.clone(),
        )),
    );
    registry.register(
        "exports",
        "export_render",
        Arc::new(ExportRenderHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.warehouse),
            Arc::clone(&blobs),
            clock.clone(),
            collaborators.exports.clone(),
        )),
    );
    registry.register(
        "alerts",
        "alert_evaluate",
        Arc::new(AlertEvaluateHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.warehouse),
            clock.clone(),
            collaborators.alerts.clone(),
            collaborators.channels.clone(),
        )),
    );
    registry.register(
        "reports",
        "report_generate",
        Arc::new(ReportGenerateHandler::new(
            Arc::clone(store),
            Arc::clone(&collaborators.warehouse),
            blobs,
            clock.clone(),
            collaborators.reports.clone(),
        )),
    );
    registry.register(
        "ingest",
        "crm_ingest_offset",
        Arc::new(CrmIngestOffsetHandler::new(replay_control)),
    );
}

/// Periodic retention sweep per configured staging kind.
async fn retention_loop(store: Arc<Store>, config: Config, shutdown: CancellationToken) {
    let interval = Duration::from_millis(config.retention.sweep_interval_ms);
    let clock = SystemClock;
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
        let now = sift_core::Clock::epoch_ms(&clock);
        for (kind_name, days) in &config.retention.window_days {
            let kind = match StagingKind::ALL.iter().find(|k| k.label() == kind_name.as_str()) {
                Some(kind) => *kind,
                None => continue,
            };
            let window_ms = *days as u64 * 24 * 60 * 60 * 1000;
            match store.enforce_retention(kind, window_ms, now) {
                Ok(dropped) if !dropped.is_empty() => {
                    info!(kind = %kind, partitions = dropped.len(), "retention sweep dropped");
                }
                Ok(_) => {}
                Err(e) => warn!(kind = %kind, error = %e, "retention sweep failed"),
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
