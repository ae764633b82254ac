//! In-process partitioned log.
//!
//! `MemoryLog` is an append-only, keyed, partitioned log living entirely in
//! process memory. It implements the same `LogConsumer`/`LogProducer`
//! traits a broker-backed client would, which makes it the backbone of the
//! test suites and of single-process deployments of the runtime harness.
//!
//! Records are routed to partitions by a SipHash of the key, so records
//! sharing a key always land on the same partition and are observed in
//! append order.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use siphasher::sip::SipHasher;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::traits::{LogConsumer, LogProducer, LogRecord, RebalanceListener};

struct Shared {
    /// One append-only vector per partition.
    partitions: Vec<Vec<LogRecord>>,
    /// group -> (partition -> next offset to consume).
    committed: HashMap<String, HashMap<u32, u64>>,
}

/// An in-process partitioned log. Cheap to clone; clones share storage.
#[derive(Clone)]
pub struct MemoryLog {
    partition_count: u32,
    shared: Arc<Mutex<Shared>>,
}

impl MemoryLog {
    /// Create a log with the given number of partitions (at least one).
    pub fn new(partition_count: u32) -> Self {
        let partition_count = partition_count.max(1);
        Self {
            partition_count,
            shared: Arc::new(Mutex::new(Shared {
                partitions: (0..partition_count).map(|_| Vec::new()).collect(),
                committed: HashMap::new(),
            })),
        }
    }

    /// Number of partitions in this log.
    pub fn partition_count(&self) -> u32 {
        self.partition_count
    }

    /// Deterministic key-to-partition routing via SipHash.
    pub fn partition_for_key(&self, key: &str) -> u32 {
        let mut hasher = SipHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partition_count as u64) as u32
    }

    /// Subscribe a consumer-group member. The single member is assigned
    /// every partition; the listener (if any) is notified before the
    /// consumer returns.
    pub async fn subscribe(
        &self,
        group: &str,
        listener: Option<Arc<dyn RebalanceListener>>,
    ) -> MemoryLogConsumer {
        let assignment: Vec<u32> = (0..self.partition_count).collect();
        if let Some(listener) = &listener {
            listener.on_partitions_assigned(&assignment).await;
        }

        let positions = {
            let shared = self.shared.lock().await;
            assignment
                .iter()
                .map(|&p| {
                    let committed = shared
                        .committed
                        .get(group)
                        .and_then(|offsets| offsets.get(&p))
                        .copied()
                        .unwrap_or(0);
                    (p, committed)
                })
                .collect()
        };

        MemoryLogConsumer {
            group: group.to_string(),
            partition_count: self.partition_count,
            shared: Arc::clone(&self.shared),
            positions,
            listener,
            closed: false,
        }
    }

    /// All records currently on a partition (diagnostics and tests).
    pub async fn records(&self, partition: u32) -> Vec<LogRecord> {
        let shared = self.shared.lock().await;
        shared
            .partitions
            .get(partition as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// All records across every partition, in (partition, offset) order.
    pub async fn all_records(&self) -> Vec<LogRecord> {
        let shared = self.shared.lock().await;
        shared.partitions.iter().flatten().cloned().collect()
    }

    /// The committed next-offset for a group on a partition, if any.
    pub async fn committed(&self, group: &str, partition: u32) -> Option<u64> {
        let shared = self.shared.lock().await;
        shared
            .committed
            .get(group)
            .and_then(|offsets| offsets.get(&partition))
            .copied()
    }
}

#[async_trait]
impl LogProducer for MemoryLog {
    async fn send(&self, key: &str, value: Bytes) -> Result<()> {
        let partition = self.partition_for_key(key);
        let mut shared = self.shared.lock().await;
        let log = &mut shared.partitions[partition as usize];
        let record = LogRecord {
            partition,
            offset: log.len() as u64,
            key: key.to_string(),
            value,
            timestamp: chrono::Utc::now().timestamp_millis() as u64,
        };
        log.push(record);
        Ok(())
    }
}

/// A consumer over a [`MemoryLog`], tracking its own read positions.
pub struct MemoryLogConsumer {
    group: String,
    partition_count: u32,
    shared: Arc<Mutex<Shared>>,
    /// partition -> next offset to read.
    positions: HashMap<u32, u64>,
    listener: Option<Arc<dyn RebalanceListener>>,
    closed: bool,
}

#[async_trait]
impl LogConsumer for MemoryLogConsumer {
    async fn poll(&mut self, max_records: usize) -> Result<Vec<LogRecord>> {
        if self.closed || max_records == 0 {
            return Ok(vec![]);
        }
        let shared = self.shared.lock().await;
        let mut batch = Vec::new();
        for partition in 0..self.partition_count {
            let position = self.positions.entry(partition).or_insert(0);
            let log = &shared.partitions[partition as usize];
            while (*position as usize) < log.len() && batch.len() < max_records {
                batch.push(log[*position as usize].clone());
                *position += 1;
            }
            if batch.len() >= max_records {
                break;
            }
        }
        Ok(batch)
    }

    async fn commit(&mut self, offsets: &HashMap<u32, u64>) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let group_offsets = shared.committed.entry(self.group.clone()).or_default();
        for (&partition, &next) in offsets {
            let slot = group_offsets.entry(partition).or_insert(0);
            if next < *slot {
                // Committed positions only move forward.
                debug!(
                    partition,
                    committed = *slot,
                    requested = next,
                    "ignoring commit rewind"
                );
                continue;
            }
            *slot = next;
        }
        Ok(())
    }

    fn assignment(&self) -> Vec<u32> {
        if self.closed {
            return vec![];
        }
        (0..self.partition_count).collect()
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(listener) = &self.listener {
            let assignment: Vec<u32> = (0..self.partition_count).collect();
            listener.on_partitions_revoked(&assignment).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ---------------------------------------------------------------
    // Partition routing
    // ---------------------------------------------------------------

    #[test]
    fn test_same_key_same_partition() {
        let log = MemoryLog::new(8);
        let a = log.partition_for_key("b1");
        for _ in 0..10 {
            assert_eq!(log.partition_for_key("b1"), a);
        }
    }

    #[test]
    fn test_partition_in_range() {
        let log = MemoryLog::new(4);
        for i in 0..100 {
            let p = log.partition_for_key(&format!("key-{i}"));
            assert!(p < 4);
        }
    }

    #[test]
    fn test_single_partition_routing() {
        let log = MemoryLog::new(1);
        assert_eq!(log.partition_for_key("anything"), 0);
    }

    #[test]
    fn test_zero_partitions_clamped_to_one() {
        let log = MemoryLog::new(0);
        assert_eq!(log.partition_count(), 1);
    }

    // ---------------------------------------------------------------
    // Produce / consume
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_send_appends_in_order() {
        let log = MemoryLog::new(1);
        log.send("k", Bytes::from("first")).await.unwrap();
        log.send("k", Bytes::from("second")).await.unwrap();

        let records = log.records(0).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offset, 0);
        assert_eq!(records[1].offset, 1);
        assert_eq!(records[0].value, Bytes::from("first"));
        assert_eq!(records[1].value, Bytes::from("second"));
    }

    #[tokio::test]
    async fn test_poll_returns_per_partition_order() {
        let log = MemoryLog::new(1);
        for i in 0..5 {
            log.send("k", Bytes::from(format!("v{i}"))).await.unwrap();
        }

        let mut consumer = log.subscribe("g", None).await;
        let batch = consumer.poll(100).await.unwrap();
        assert_eq!(batch.len(), 5);
        for (i, record) in batch.iter().enumerate() {
            assert_eq!(record.offset, i as u64);
        }
    }

    #[tokio::test]
    async fn test_poll_respects_max_records() {
        let log = MemoryLog::new(1);
        for _ in 0..10 {
            log.send("k", Bytes::from("v")).await.unwrap();
        }

        let mut consumer = log.subscribe("g", None).await;
        let batch = consumer.poll(3).await.unwrap();
        assert_eq!(batch.len(), 3);
        let batch = consumer.poll(100).await.unwrap();
        assert_eq!(batch.len(), 7);
    }

    #[tokio::test]
    async fn test_poll_empty_when_caught_up() {
        let log = MemoryLog::new(2);
        let mut consumer = log.subscribe("g", None).await;
        assert!(consumer.poll(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_sees_records_produced_after_subscribe() {
        let log = MemoryLog::new(1);
        let mut consumer = log.subscribe("g", None).await;
        assert!(consumer.poll(10).await.unwrap().is_empty());

        log.send("k", Bytes::from("late")).await.unwrap();
        let batch = consumer.poll(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].value, Bytes::from("late"));
    }

    // ---------------------------------------------------------------
    // Commit semantics
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_commit_and_resume() {
        let log = MemoryLog::new(1);
        for i in 0..4 {
            log.send("k", Bytes::from(format!("v{i}"))).await.unwrap();
        }

        let mut consumer = log.subscribe("g", None).await;
        let batch = consumer.poll(2).await.unwrap();
        assert_eq!(batch.len(), 2);

        let mut offsets = HashMap::new();
        offsets.insert(0u32, 2u64);
        consumer.commit(&offsets).await.unwrap();
        drop(consumer);

        // A fresh subscription resumes from the committed position.
        let mut resumed = log.subscribe("g", None).await;
        let batch = resumed.poll(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].offset, 2);
    }

    #[tokio::test]
    async fn test_commit_rewind_ignored() {
        let log = MemoryLog::new(1);
        let mut consumer = log.subscribe("g", None).await;

        let mut offsets = HashMap::new();
        offsets.insert(0u32, 5u64);
        consumer.commit(&offsets).await.unwrap();

        offsets.insert(0u32, 2u64);
        consumer.commit(&offsets).await.unwrap();

        assert_eq!(log.committed("g", 0).await, Some(5));
    }

    #[tokio::test]
    async fn test_commits_isolated_per_group() {
        let log = MemoryLog::new(1);
        let mut a = log.subscribe("group-a", None).await;
        let mut offsets = HashMap::new();
        offsets.insert(0u32, 3u64);
        a.commit(&offsets).await.unwrap();

        assert_eq!(log.committed("group-a", 0).await, Some(3));
        assert_eq!(log.committed("group-b", 0).await, None);
    }

    // ---------------------------------------------------------------
    // Rebalance callbacks
    // ---------------------------------------------------------------

    struct CountingListener {
        assigned: AtomicUsize,
        revoked: AtomicUsize,
    }

    #[async_trait]
    impl RebalanceListener for CountingListener {
        async fn on_partitions_assigned(&self, partitions: &[u32]) {
            self.assigned.fetch_add(partitions.len(), Ordering::SeqCst);
        }
        async fn on_partitions_revoked(&self, partitions: &[u32]) {
            self.revoked.fetch_add(partitions.len(), Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_subscribe_fires_assignment() {
        let log = MemoryLog::new(3);
        let listener = Arc::new(CountingListener {
            assigned: AtomicUsize::new(0),
            revoked: AtomicUsize::new(0),
        });

        let consumer = log.subscribe("g", Some(listener.clone())).await;
        assert_eq!(listener.assigned.load(Ordering::SeqCst), 3);
        assert_eq!(consumer.assignment(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_close_fires_revocation() {
        let log = MemoryLog::new(2);
        let listener = Arc::new(CountingListener {
            assigned: AtomicUsize::new(0),
            revoked: AtomicUsize::new(0),
        });

        let mut consumer = log.subscribe("g", Some(listener.clone())).await;
        consumer.close().await.unwrap();
        assert_eq!(listener.revoked.load(Ordering::SeqCst), 2);
        assert!(consumer.assignment().is_empty());

        // Closing twice is a no-op.
        consumer.close().await.unwrap();
        assert_eq!(listener.revoked.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closed_consumer_polls_nothing() {
        let log = MemoryLog::new(1);
        log.send("k", Bytes::from("v")).await.unwrap();

        let mut consumer = log.subscribe("g", None).await;
        consumer.close().await.unwrap();
        assert!(consumer.poll(10).await.unwrap().is_empty());
    }

    // ---------------------------------------------------------------
    // Key routing across partitions
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_records_with_same_key_share_partition() {
        let log = MemoryLog::new(8);
        for i in 0..5 {
            log.send("b7", Bytes::from(format!("v{i}"))).await.unwrap();
        }

        let partition = log.partition_for_key("b7");
        let records = log.records(partition).await;
        assert_eq!(records.len(), 5);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.offset, i as u64);
            assert_eq!(record.key, "b7");
        }
    }
}
