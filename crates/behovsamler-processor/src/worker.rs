//! Worker runtime.
//!
//! Drives the consumer loop as a background tokio task. Within the task
//! processing is strictly sequential: records from one poll are applied
//! one at a time, in per-partition offset order, so the state machine's
//! inputs for any identifier arrive in log order.
//!
//! Offsets become eligible for commit once the accumulator has persisted
//! the corresponding state mutation; the loop commits them when the
//! configured interval has elapsed, and always on shutdown. Shutdown is
//! cooperative: a `Stop` signal finishes the in-flight batch, commits,
//! releases the subscription (firing revocation callbacks), and returns.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use behovsamler_log::{BusConfig, LogConsumer, RebalanceListener};
use behovsamler_state::StateStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accumulator::Accumulator;
use crate::error::{ProcessorError, Result};
use crate::metrics;

/// Control signals sent from the handle to the worker task.
#[derive(Debug)]
enum ControlSignal {
    Stop,
}

/// Configures the worker loop.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Identifies this worker instance in logs.
    pub worker_id: String,
    /// Maximum records fetched per poll.
    pub max_poll_records: usize,
    /// Sleep between polls when the log is idle.
    pub idle_backoff: Duration,
    /// Upper bound on delay between a durable state write and the
    /// corresponding offset commit.
    pub commit_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_id: Uuid::new_v4().to_string(),
            max_poll_records: 500,
            idle_backoff: Duration::from_millis(100),
            commit_interval: Duration::from_millis(1000),
        }
    }
}

impl RuntimeConfig {
    /// Derive the worker tuning from a parsed bus configuration.
    pub fn from_bus_config(config: &BusConfig) -> Self {
        Self {
            max_poll_records: config.max_poll_records,
            idle_backoff: Duration::from_millis(config.poll_timeout_ms),
            commit_interval: Duration::from_millis(config.commit_interval_ms),
            ..Default::default()
        }
    }
}

/// Bridges partition rebalances to the state store: assigned sections are
/// rebuilt from their changelog before records arrive, revoked sections
/// are released after delivery stops.
pub struct StoreRebalanceListener {
    store: Arc<dyn StateStore>,
}

impl StoreRebalanceListener {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl RebalanceListener for StoreRebalanceListener {
    async fn on_partitions_assigned(&self, partitions: &[u32]) {
        for &partition in partitions {
            metrics::REBALANCES_TOTAL
                .with_label_values(&["assigned"])
                .inc();
            match self.store.restore(partition).await {
                Ok(entries) => {
                    metrics::STATE_RESTORES_TOTAL.inc();
                    info!(partition, entries, "partition assigned, state restored");
                }
                Err(e) => {
                    error!(partition, error = %e, "failed to restore state section");
                }
            }
        }
    }

    async fn on_partitions_revoked(&self, partitions: &[u32]) {
        for &partition in partitions {
            metrics::REBALANCES_TOTAL
                .with_label_values(&["revoked"])
                .inc();
            if let Err(e) = self.store.unload(partition).await {
                warn!(partition, error = %e, "failed to unload state section");
            } else {
                info!(partition, "partition revoked, state section released");
            }
        }
    }
}

/// Handle to the running worker task.
pub struct Runtime {
    control_tx: mpsc::Sender<ControlSignal>,
    join_handle: JoinHandle<Result<()>>,
}

impl Runtime {
    /// Spawn the worker loop over a subscribed consumer.
    pub fn start(
        mut consumer: Box<dyn LogConsumer>,
        accumulator: Accumulator,
        config: RuntimeConfig,
    ) -> Self {
        let (control_tx, mut control_rx) = mpsc::channel::<ControlSignal>(16);
        let worker_id = config.worker_id.clone();

        let join_handle = tokio::spawn(async move {
            info!(worker = %worker_id, assignment = ?consumer.assignment(), "worker started");

            // partition -> next offset to commit, populated as records are
            // durably processed.
            let mut pending: HashMap<u32, u64> = HashMap::new();
            let mut last_commit = Instant::now();

            loop {
                let stop = match control_rx.try_recv() {
                    Ok(ControlSignal::Stop) => true,
                    Err(mpsc::error::TryRecvError::Empty) => false,
                    Err(mpsc::error::TryRecvError::Disconnected) => {
                        warn!(worker = %worker_id, "control channel closed, stopping");
                        true
                    }
                };
                if stop {
                    commit_pending(consumer.as_mut(), &mut pending, &worker_id).await;
                    if let Err(e) = consumer.close().await {
                        warn!(worker = %worker_id, error = %e, "error releasing subscription");
                    }
                    info!(worker = %worker_id, "worker stopped");
                    return Ok(());
                }

                match consumer.poll(config.max_poll_records).await {
                    Ok(records) if records.is_empty() => {
                        tokio::time::sleep(config.idle_backoff).await;
                    }
                    Ok(records) => {
                        for record in records {
                            match accumulator.process(&record).await {
                                Ok(_) => {
                                    pending.insert(record.partition, record.offset + 1);
                                }
                                Err(e) => {
                                    // Fatal to this worker; the partition
                                    // set is abandoned for reassignment.
                                    error!(
                                        worker = %worker_id,
                                        partition = record.partition,
                                        offset = record.offset,
                                        error = %e,
                                        "processing failed, abandoning partitions"
                                    );
                                    commit_pending(consumer.as_mut(), &mut pending, &worker_id)
                                        .await;
                                    let _ = consumer.close().await;
                                    return Err(e);
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(worker = %worker_id, error = %e, "poll failed, backing off");
                        tokio::time::sleep(config.idle_backoff).await;
                    }
                }

                if !pending.is_empty() && last_commit.elapsed() >= config.commit_interval {
                    commit_pending(consumer.as_mut(), &mut pending, &worker_id).await;
                    last_commit = Instant::now();
                }
            }
        });

        Self {
            control_tx,
            join_handle,
        }
    }

    /// Signal the worker to stop and wait for it to finish its in-flight
    /// batch, commit, and release its subscription.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.control_tx.send(ControlSignal::Stop).await;
        match self.join_handle.await {
            Ok(result) => result,
            Err(e) => Err(ProcessorError::Runtime(format!(
                "worker task panicked: {e}"
            ))),
        }
    }

    /// Whether the worker task has exited (normally or fatally).
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }
}

/// Commit all pending offsets, keeping them on failure for the next try.
async fn commit_pending(
    consumer: &mut dyn LogConsumer,
    pending: &mut HashMap<u32, u64>,
    worker_id: &str,
) {
    if pending.is_empty() {
        return;
    }
    match consumer.commit(pending).await {
        Ok(()) => pending.clear(),
        Err(e) => warn!(worker = %worker_id, error = %e, "offset commit failed, will retry"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use behovsamler_core::Envelope;
    use behovsamler_log::{LogProducer, MemoryLog};
    use behovsamler_state::{MemoryStateStore, StateStore};
    use bytes::Bytes;

    fn fast_config() -> RuntimeConfig {
        RuntimeConfig {
            max_poll_records: 100,
            idle_backoff: Duration::from_millis(5),
            commit_interval: Duration::from_millis(10),
            ..Default::default()
        }
    }

    async fn produce(log: &MemoryLog, key: &str, value: &str) {
        log.send(key, Bytes::from(value.to_string())).await.unwrap();
    }

    async fn finals(log: &MemoryLog) -> Vec<Envelope> {
        log.all_records()
            .await
            .iter()
            .filter_map(|r| Envelope::from_bytes(&r.value).ok())
            .filter(|e| e.is_final())
            .collect()
    }

    async fn wait_for_finals(log: &MemoryLog, expected: usize) -> Vec<Envelope> {
        for _ in 0..200 {
            let found = finals(log).await;
            if found.len() >= expected {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {expected} final record(s)");
    }

    // ---------------------------------------------------------------
    // End-to-end
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_worker_joins_and_emits() {
        let log = MemoryLog::new(4);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        produce(&log, "b1", r#"{"@id":"b1","@behov":["A","B"]}"#).await;
        produce(&log, "b1", r#"{"@id":"b1","@behov":["A","B"],"@løsning":{"A":1}}"#).await;
        produce(&log, "b1", r#"{"@id":"b1","@behov":["A","B"],"@løsning":{"B":2}}"#).await;

        let consumer = log.subscribe("test-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(Box::new(consumer), accumulator, fast_config());

        let emitted = wait_for_finals(&log, 1).await;
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].id(), Some("b1"));

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_worker_ignores_its_own_finals() {
        let log = MemoryLog::new(1);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        produce(&log, "b1", r#"{"@id":"b1","@behov":["A"],"@løsning":{"A":1}}"#).await;

        let consumer = log.subscribe("test-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(Box::new(consumer), accumulator, fast_config());

        wait_for_finals(&log, 1).await;
        // Give the worker time to consume its own final.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(finals(&log).await.len(), 1);

        runtime.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_commits_offsets() {
        let log = MemoryLog::new(1);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        produce(&log, "b1", r#"{"@id":"b1","@behov":["A","B"]}"#).await;
        produce(&log, "b1", r#"{"@id":"b1","@løsning":{"A":1}}"#).await;

        let consumer = log.subscribe("commit-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(
            Box::new(consumer),
            accumulator,
            RuntimeConfig {
                // Interval far beyond the test, so only shutdown commits.
                commit_interval: Duration::from_secs(3600),
                idle_backoff: Duration::from_millis(5),
                ..fast_config()
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.shutdown().await.unwrap();

        assert_eq!(log.committed("commit-group", 0).await, Some(2));
    }

    #[tokio::test]
    async fn test_resume_does_not_reemit_committed_completions() {
        let log = MemoryLog::new(1);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        produce(&log, "b1", r#"{"@id":"b1","@behov":["A"],"@løsning":{"A":1}}"#).await;

        let consumer = log.subscribe("resume-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(Box::new(consumer), accumulator, fast_config());
        wait_for_finals(&log, 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.shutdown().await.unwrap();

        // A second worker in the same group resumes after the committed
        // position and sees nothing new to complete.
        let consumer = log.subscribe("resume-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(Box::new(consumer), accumulator, fast_config());
        tokio::time::sleep(Duration::from_millis(50)).await;
        runtime.shutdown().await.unwrap();

        assert_eq!(finals(&log).await.len(), 1);
    }

    #[tokio::test]
    async fn test_stop_with_no_records_is_clean() {
        let log = MemoryLog::new(2);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());

        let consumer = log.subscribe("idle-group", None).await;
        let accumulator = Accumulator::new(Arc::clone(&store), Arc::new(log.clone()));
        let runtime = Runtime::start(Box::new(consumer), accumulator, fast_config());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!runtime.is_finished());
        runtime.shutdown().await.unwrap();
    }

    // ---------------------------------------------------------------
    // Rebalance listener
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_listener_restores_on_assignment() {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        store.put(0, "b1", b"{}").await.unwrap();

        let listener = StoreRebalanceListener::new(Arc::clone(&store));
        listener.on_partitions_assigned(&[0, 1]).await;
        listener.on_partitions_revoked(&[0, 1]).await;
        // MemoryStateStore keeps data across unload.
        assert_eq!(store.get(0, "b1").await.unwrap(), Some(b"{}".to_vec()));
    }

    #[tokio::test]
    async fn test_subscribe_with_listener_restores_before_delivery() {
        let log = MemoryLog::new(2);
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let listener = Arc::new(StoreRebalanceListener::new(Arc::clone(&store)));

        let consumer = log.subscribe("g", Some(listener)).await;
        assert_eq!(consumer.assignment(), vec![0, 1]);
    }

    // ---------------------------------------------------------------
    // Config
    // ---------------------------------------------------------------

    #[test]
    fn test_runtime_config_default() {
        let config = RuntimeConfig::default();
        assert_eq!(config.max_poll_records, 500);
        assert_eq!(config.idle_backoff, Duration::from_millis(100));
        assert_eq!(config.commit_interval, Duration::from_millis(1000));
        assert!(!config.worker_id.is_empty());
    }

    #[test]
    fn test_runtime_config_from_bus_config() {
        let mut map = std::collections::HashMap::new();
        map.insert("bootstrap.servers".to_string(), "b:9092".to_string());
        map.insert("topic".to_string(), "t".to_string());
        map.insert("group.id".to_string(), "g".to_string());
        map.insert("max.poll.records".to_string(), "42".to_string());
        map.insert("poll.timeout.ms".to_string(), "7".to_string());
        map.insert("commit.interval.ms".to_string(), "9".to_string());
        let bus = BusConfig::from_config_map(&map).unwrap();

        let config = RuntimeConfig::from_bus_config(&bus);
        assert_eq!(config.max_poll_records, 42);
        assert_eq!(config.idle_backoff, Duration::from_millis(7));
        assert_eq!(config.commit_interval, Duration::from_millis(9));
    }
}
