// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Sift Analytics

//! Partitioned log transport contract.
//!
//! The external log supports consumer groups, partition assignment, offset
//! commit, and opaque byte payloads. The in-memory implementation backs
//! tests and local development; a broker-backed adapter plugs in behind the
//! same trait.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Invalid credentials or topology; fatal at startup.
    #[error("log config: {0}")]
    Config(String),

    /// Broker unreachable; retry with backoff.
    #[error("log transport: {0}")]
    Unreachable(String),
}

/// One partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicPartition {
    pub topic: String,
    pub partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self { topic: topic.into(), partition }
    }
}

impl std::fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// An opaque record pulled from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub payload: Vec<u8>,
}

#[async_trait]
pub trait LogTransport: Send + Sync + 'static {
    /// Join the consumer group and return the assigned partitions.
    async fn subscribe(
        &self,
        topics: &[String],
        group_id: &str,
    ) -> Result<Vec<TopicPartition>, TransportError>;

    /// Pull up to `max_records` starting at `from_offset`, in offset order.
    async fn poll(
        &self,
        tp: &TopicPartition,
        from_offset: i64,
        max_records: usize,
    ) -> Result<Vec<LogRecord>, TransportError>;

    /// Durably record that the group has consumed everything below `offset`.
    async fn commit(
        &self,
        group_id: &str,
        tp: &TopicPartition,
        offset: i64,
    ) -> Result<(), TransportError>;

    /// The group's committed offset (0 when never committed).
    async fn committed(&self, group_id: &str, tp: &TopicPartition)
        -> Result<i64, TransportError>;

    /// Offset one past the last published record.
    async fn latest_offset(&self, tp: &TopicPartition) -> Result<i64, TransportError>;
}

#[cfg(any(test, feature = "test-support"))]
pub use in_memory::InMemoryLog;

#[cfg(any(test, feature = "test-support"))]
mod in_memory {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// In-memory partitioned log with consumer-group offsets.
    #[derive(Default)]
    pub struct InMemoryLog {
        partitions: Mutex<HashMap<TopicPartition, Vec<LogRecord>>>,
        committed: Mutex<HashMap<(String, TopicPartition), i64>>,
        fail_polls: AtomicU32,
    }

    impl InMemoryLog {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn create_topic(&self, topic: &str, partitions: i32) {
            let mut map = self.partitions.lock();
            for partition in 0..partitions {
                map.entry(TopicPartition::new(topic, partition)).or_default();
            }
        }

        /// Append a record; returns its offset.
        pub fn publish(&self, topic: &str, partition: i32, payload: Vec<u8>) -> i64 {
            let tp = TopicPartition::new(topic, partition);
            let mut map = self.partitions.lock();
            let records = map.entry(tp.clone()).or_default();
            let offset = records.len() as i64;
            records.push(LogRecord { topic: tp.topic, partition, offset, payload });
            offset
        }

        /// Publish an envelope as tagged JSON.
        pub fn publish_json(
            &self,
            topic: &str,
            partition: i32,
            envelope: &sift_core::EventEnvelope,
        ) -> i64 {
            let payload = serde_json::to_vec(envelope).unwrap_or_default();
            self.publish(topic, partition, payload)
        }

        /// Publish an envelope with the 5-byte registry framing prefix.
        pub fn publish_framed(
            &self,
            topic: &str,
            partition: i32,
            schema_id: u32,
            envelope: &sift_core::EventEnvelope,
        ) -> i64 {
            let mut payload = vec![crate::decode::WIRE_FORMAT_MAGIC];
            payload.extend_from_slice(&schema_id.to_be_bytes());
            payload.extend_from_slice(&serde_json::to_vec(envelope).unwrap_or_default());
            self.publish(topic, partition, payload)
        }

        /// Make the next `n` polls fail with a transport error.
        pub fn fail_next_polls(&self, n: u32) {
            self.fail_polls.store(n, Ordering::SeqCst);
        }

        pub fn committed_offset(&self, group_id: &str, tp: &TopicPartition) -> i64 {
            self.committed.lock().get(&(group_id.to_string(), tp.clone())).copied().unwrap_or(0)
        }

        /// Forget the group's committed offset (simulates a crash before
        /// commit).
        pub fn commit_reset(&self, group_id: &str, tp: &TopicPartition) {
            self.committed.lock().remove(&(group_id.to_string(), tp.clone()));
        }

        /// Delete a partition so the next poll fails with a config error
        /// (simulates broker-side topology loss).
        pub fn remove_partition(&self, topic: &str, partition: i32) {
            self.partitions.lock().remove(&TopicPartition::new(topic, partition));
        }
    }

    #[async_trait]
    impl LogTransport for InMemoryLog {
        async fn subscribe(
            &self,
            topics: &[String],
            group_id: &str,
        ) -> Result<Vec<TopicPartition>, TransportError> {
            if group_id.is_empty() {
                return Err(TransportError::Config("empty consumer group id".to_string()));
            }
            let map = self.partitions.lock();
            let mut assigned: Vec<TopicPartition> =
                map.keys().filter(|tp| topics.contains(&tp.topic)).cloned().collect();
            assigned.sort_by(|a, b| a.topic.cmp(&b.topic).then(a.partition.cmp(&b.partition)));
            if assigned.is_empty() {
                return Err(TransportError::Config(format!(
                    "no partitions found for topics {topics:?}"
                )));
            }
            Ok(assigned)
        }

        async fn poll(
            &self,
            tp: &TopicPartition,
            from_offset: i64,
            max_records: usize,
        ) -> Result<Vec<LogRecord>, TransportError> {
            if self
                .fail_polls
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(TransportError::Unreachable("injected poll failure".to_string()));
            }
            let map = self.partitions.lock();
            let records = map
                .get(tp)
                .ok_or_else(|| TransportError::Config(format!("unknown partition {tp}")))?;
            let start = from_offset.max(0) as usize;
            Ok(records.iter().skip(start).take(max_records).cloned().collect())
        }

        async fn commit(
            &self,
            group_id: &str,
            tp: &TopicPartition,
            offset: i64,
        ) -> Result<(), TransportError> {
            self.committed.lock().insert((group_id.to_string(), tp.clone()), offset);
            Ok(())
        }

        async fn committed(
            &self,
            group_id: &str,
            tp: &TopicPartition,
        ) -> Result<i64, TransportError> {
            Ok(self.committed_offset(group_id, tp))
        }

        async fn latest_offset(&self, tp: &TopicPartition) -> Result<i64, TransportError> {
            Ok(self.partitions.lock().get(tp).map(|r| r.len() as i64).unwrap_or(0))
        }
    }
}
