//! The per-record accumulation pipeline.
//!
//! For each inbound record: filter out our own finals, drop malformed
//! payloads, load or create the identifier's state, apply the record as a
//! state transition, emit a final when the transition completes the need,
//! and persist the new state. The input offset becomes eligible for
//! commit only after the persist returns.
//!
//! Emission happens before the persist, and the offset commit after both,
//! so a crash anywhere in the pipeline re-processes the triggering record
//! on restart: emission is at-least-once, state convergence is idempotent
//! (last write wins on every field).

use std::sync::Arc;

use behovsamler_core::Envelope;
use behovsamler_log::{retry_with_backoff, LogProducer, LogRecord, RetryPolicy};
use behovsamler_state::StateStore;
use tracing::{debug, info, warn};

use crate::error::{ProcessorError, Result};
use crate::metrics;
use crate::need_state::{NeedState, Transition};

/// What became of one inbound record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The record was emitted by this component; ignored.
    SkippedFinal,
    /// Not a JSON object with a string `@id`; dropped and counted.
    Malformed,
    /// State advanced but the need is not complete.
    Updated,
    /// The need completed (or re-completed); a final was emitted.
    Completed,
}

impl Outcome {
    fn as_label(&self) -> &'static str {
        match self {
            Outcome::SkippedFinal => "skipped_final",
            Outcome::Malformed => "malformed",
            Outcome::Updated => "updated",
            Outcome::Completed => "completed",
        }
    }
}

/// The stateful processor joining needs with their solutions.
pub struct Accumulator {
    store: Arc<dyn StateStore>,
    producer: Arc<dyn LogProducer>,
    retry: RetryPolicy,
}

impl Accumulator {
    pub fn new(store: Arc<dyn StateStore>, producer: Arc<dyn LogProducer>) -> Self {
        Self {
            store,
            producer,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy applied to final-record sends.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Process one inbound record.
    ///
    /// Returns `Err` only on failures that are fatal to the worker (state
    /// store write failure, producer failure beyond retries). Malformed
    /// input is not an error: it is dropped, counted, and its offset is
    /// still committed.
    pub async fn process(&self, record: &LogRecord) -> Result<Outcome> {
        let outcome = self.process_inner(record).await?;
        metrics::RECORDS_PROCESSED_TOTAL
            .with_label_values(&[outcome.as_label()])
            .inc();
        Ok(outcome)
    }

    async fn process_inner(&self, record: &LogRecord) -> Result<Outcome> {
        let envelope = match Envelope::from_bytes(&record.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    error = %e,
                    "dropping malformed record"
                );
                metrics::MALFORMED_RECORDS_TOTAL.inc();
                return Ok(Outcome::Malformed);
            }
        };

        // Our own finals come back on the consumed topic; test the flag
        // before anything else.
        if envelope.is_final() {
            debug!(
                partition = record.partition,
                offset = record.offset,
                "skipping own final record"
            );
            return Ok(Outcome::SkippedFinal);
        }

        let id = match envelope.id() {
            Some(id) => id.to_string(),
            None => {
                warn!(
                    partition = record.partition,
                    offset = record.offset,
                    "dropping record without a string @id"
                );
                metrics::MALFORMED_RECORDS_TOTAL.inc();
                return Ok(Outcome::Malformed);
            }
        };

        let mut state = match self.store.get(record.partition, &id).await? {
            Some(raw) => serde_json::from_slice::<NeedState>(&raw).map_err(|e| {
                ProcessorError::StateDecode(format!("stored state for '{id}' is unreadable: {e}"))
            })?,
            None => NeedState::new(&id, &envelope),
        };

        let transition = state.apply(&envelope, record.offset);

        if transition == Transition::Completed {
            let payload = state.final_record()?.to_bytes()?;
            let producer = Arc::clone(&self.producer);
            let key = id.clone();
            retry_with_backoff(&self.retry, || {
                let producer = Arc::clone(&producer);
                let key = key.clone();
                let payload = payload.clone();
                async move { producer.send(&key, payload).await }
            })
            .await?;
            metrics::FINALS_EMITTED_TOTAL.inc();
            info!(
                id = %id,
                partition = record.partition,
                offset = record.offset,
                kinds = state.solutions.len(),
                "need completed, final record emitted"
            );
        }

        let raw = serde_json::to_vec(&state).map_err(|e| {
            ProcessorError::StateDecode(format!("state for '{id}' is unserialisable: {e}"))
        })?;
        self.store.put(record.partition, &id, &raw).await?;

        Ok(match transition {
            Transition::Completed => Outcome::Completed,
            Transition::Updated => Outcome::Updated,
        })
    }
}
