// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sift-engine: queue engine, scheduler, and cache orchestration.
//!
//! The queue engine delivers persistent jobs to registered handlers with
//! leases, retries, and dead-lettering. The scheduler turns cron recurrences
//! into queue submissions. The cache orchestrator serves fingerprinted
//! results with single-flight recomputation. All three share the store as
//! their only synchronization point.

pub mod cache;
pub mod error;
pub mod handlers;
pub mod janitor;
pub mod orchestrator;
pub mod queue;
pub mod registry;
pub mod scheduler;

pub use cache::{Cache, CacheConfig};
pub use error::{EngineError, HandlerError};
pub use janitor::Janitor;
pub use orchestrator::CacheOrchestrator;
pub use queue::{DeadLetter, QueueConfig, QueueEngine, WorkerPool};
pub use registry::{HandlerRegistry, JobContext, JobHandler, LeaseExtender};
pub use scheduler::{Scheduler, SchedulerConfig};
