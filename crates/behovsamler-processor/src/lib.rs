//! The behovsamler accumulator.
//!
//! Joins multi-part *need* records with partial *solution* records by
//! correlation identifier and republishes an enriched *final* record onto
//! the same topic once every required answer kind has been observed.
//!
//! ## Architecture
//!
//! - **NeedState**: the per-identifier state machine (required set,
//!   template envelope, accumulated solutions).
//! - **Accumulator**: applies one inbound record: self-echo filter,
//!   malformed drop, state transition, final emission, durable persist.
//! - **Runtime**: drives the consumer loop as a background task with
//!   interval-bounded offset commits and cooperative shutdown; bridges
//!   partition rebalances to state store restore/unload.
//! - **Metrics**: Prometheus counter families for processed, dropped and
//!   emitted records.

pub mod accumulator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod need_state;
pub mod worker;

pub use accumulator::{Accumulator, Outcome};
pub use config::AppConfig;
pub use error::{ProcessorError, Result};
pub use need_state::{NeedState, Transition};
pub use worker::{Runtime, RuntimeConfig, StoreRebalanceListener};
