//! Adapter traits for the partitioned log.
//!
//! Defines the `LogConsumer` and `LogProducer` traits that log backends
//! must satisfy, the `LogRecord` type exchanged between the adapter and
//! the processor, and the `RebalanceListener` callback interface used to
//! load and unload per-partition state.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A single record consumed from (or produced to) the log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Partition the record lives on.
    pub partition: u32,
    /// Offset within the partition.
    pub offset: u64,
    /// Record key; equal keys always land on the same partition.
    pub key: String,
    /// Record value (payload).
    pub value: Bytes,
    /// Timestamp in milliseconds since epoch.
    pub timestamp: u64,
}

/// Callback interface for partition assignment changes.
///
/// `on_partitions_assigned` is invoked before any record from a newly
/// assigned partition is delivered; `on_partitions_revoked` after delivery
/// for that partition has stopped.
#[async_trait]
pub trait RebalanceListener: Send + Sync {
    async fn on_partitions_assigned(&self, partitions: &[u32]);
    async fn on_partitions_revoked(&self, partitions: &[u32]);
}

/// A polling consumer over the partitioned log.
///
/// Records are delivered in per-partition offset order. Committed offsets
/// only ever move forward; the caller commits after downstream processing
/// has durably acted on the records.
#[async_trait]
pub trait LogConsumer: Send {
    /// Poll for up to `max_records` new records.
    ///
    /// Returns an empty vec when nothing is available.
    async fn poll(&mut self, max_records: usize) -> Result<Vec<LogRecord>>;

    /// Advance committed positions. The map carries, per partition, the
    /// offset of the next record to consume.
    async fn commit(&mut self, offsets: &HashMap<u32, u64>) -> Result<()>;

    /// Partitions currently assigned to this consumer.
    fn assignment(&self) -> Vec<u32>;

    /// Release the subscription, firing revocation callbacks for the
    /// current assignment.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A producer onto the partitioned log.
///
/// Delivery is at-least-once; records with equal keys are routed to the
/// same partition.
#[async_trait]
pub trait LogProducer: Send + Sync {
    async fn send(&self, key: &str, value: Bytes) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // LogRecord
    // ---------------------------------------------------------------

    #[test]
    fn test_record_construction() {
        let rec = LogRecord {
            partition: 2,
            offset: 17,
            key: "b1".to_string(),
            value: Bytes::from(r#"{"@id":"b1"}"#),
            timestamp: 1_700_000_000_000,
        };
        assert_eq!(rec.partition, 2);
        assert_eq!(rec.offset, 17);
        assert_eq!(rec.key, "b1");
        assert_eq!(rec.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_record_clone_eq() {
        let rec = LogRecord {
            partition: 0,
            offset: 0,
            key: "k".to_string(),
            value: Bytes::from("v"),
            timestamp: 1,
        };
        assert_eq!(rec, rec.clone());
    }

    // ---------------------------------------------------------------
    // Object safety (compile-time verification)
    // ---------------------------------------------------------------

    struct NoopListener;

    #[async_trait]
    impl RebalanceListener for NoopListener {
        async fn on_partitions_assigned(&self, _partitions: &[u32]) {}
        async fn on_partitions_revoked(&self, _partitions: &[u32]) {}
    }

    struct NoopConsumer;

    #[async_trait]
    impl LogConsumer for NoopConsumer {
        async fn poll(&mut self, _max_records: usize) -> Result<Vec<LogRecord>> {
            Ok(vec![])
        }
        async fn commit(&mut self, _offsets: &HashMap<u32, u64>) -> Result<()> {
            Ok(())
        }
        fn assignment(&self) -> Vec<u32> {
            vec![]
        }
    }

    struct NoopProducer;

    #[async_trait]
    impl LogProducer for NoopProducer {
        async fn send(&self, _key: &str, _value: Bytes) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_listener_object_safety() {
        let listener = NoopListener;
        let _: &dyn RebalanceListener = &listener;
    }

    #[test]
    fn test_consumer_object_safety() {
        let consumer = NoopConsumer;
        let _: &dyn LogConsumer = &consumer;
    }

    #[test]
    fn test_producer_object_safety() {
        let producer = NoopProducer;
        let _: &dyn LogProducer = &producer;
    }

    #[tokio::test]
    async fn test_noop_consumer_lifecycle() {
        let mut consumer = NoopConsumer;
        assert!(consumer.poll(10).await.unwrap().is_empty());
        consumer.commit(&HashMap::new()).await.unwrap();
        assert!(consumer.assignment().is_empty());
    }

    #[tokio::test]
    async fn test_noop_producer_send() {
        let producer = NoopProducer;
        producer.send("k", Bytes::from("v")).await.unwrap();
    }
}
