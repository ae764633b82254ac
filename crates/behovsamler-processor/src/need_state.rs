//! Per-identifier accumulation state.
//!
//! Every correlation identifier owns one `NeedState`, created by the
//! first observed record for that identifier (need or solution, in either
//! order) and mutated only by the worker owning the
//! identifier's partition.
//!
//! The state machine has three observable states:
//!
//! | State     | Meaning                                                  |
//! |-----------|----------------------------------------------------------|
//! | Absent    | no record yet observed                                   |
//! | Pending   | records observed, accumulated solutions do not yet cover |
//! |           | the required kinds (or the required set is still unknown)|
//! | Completed | solutions cover the required kinds, a final was emitted  |
//!
//! Completion is a superset test: solution kinds outside the required set
//! are stored but never block or force completion. A completed state that
//! receives a further solution completes again with the updated values.

use behovsamler_core::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Result of applying one inbound record to a [`NeedState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed but the required kinds are not all covered yet.
    Updated,
    /// The record made (or kept) the state complete; a final is due.
    Completed,
}

/// Accumulated state for one correlation identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NeedState {
    /// The correlation identifier (also the log key).
    pub id: String,
    /// Required answer kinds in declaration order. `None` until a record
    /// carrying `@behov` has been observed; the latest observation wins.
    pub required: Option<Vec<String>>,
    /// Full tree of the last record seen; the envelope for the next final.
    pub template: Value,
    /// Most recent payload observed per answer kind.
    pub solutions: Map<String, Value>,
    /// Offset of the record that last caused a final emission.
    pub last_completed_at: Option<u64>,
}

impl NeedState {
    /// Create state from the first observed record for an identifier.
    pub fn new(id: &str, envelope: &Envelope) -> Self {
        Self {
            id: id.to_string(),
            required: envelope.need(),
            template: envelope.tree().clone(),
            solutions: Map::new(),
            last_completed_at: None,
        }
    }

    /// Apply one inbound record: reconcile the required set, refresh the
    /// template, merge solutions (last write wins), and evaluate
    /// completeness.
    pub fn apply(&mut self, envelope: &Envelope, offset: u64) -> Transition {
        if let Some(need) = envelope.need() {
            if self.required.as_ref() != Some(&need) {
                self.required = Some(need);
            }
        }

        self.template = envelope.tree().clone();

        if let Some(solutions) = envelope.solutions() {
            for (kind, value) in solutions {
                self.solutions.insert(kind.clone(), value.clone());
            }
        }

        if self.is_complete() {
            self.last_completed_at = Some(offset);
            Transition::Completed
        } else {
            Transition::Updated
        }
    }

    /// Whether the accumulated solution kinds cover the required set.
    /// Always false while the required set is unknown.
    pub fn is_complete(&self) -> bool {
        match &self.required {
            Some(required) => required.iter().all(|kind| self.solutions.contains_key(kind)),
            None => false,
        }
    }

    /// Build the final record: the latest template with `@løsning`
    /// replaced by the accumulated solutions and `final` set.
    pub fn final_record(&self) -> Result<Envelope> {
        let template = Envelope::from_value(self.template.clone())?;
        Ok(template.with_completion(&self.solutions))
    }
}
