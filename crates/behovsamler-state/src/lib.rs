//! Partition-local, persistent state for the behovsamler stream processor.
//!
//! State is a mapping from correlation identifier to accumulated
//! need-state, held in per-partition sections that follow partition
//! ownership. Every mutation is appended to a per-partition changelog
//! before it reaches the local store, so a restarting instance rebuilds
//! its sections by replay before resuming.
//!
//! ## Architecture
//!
//! - **Trait**: `StateStore`: get/put per (partition, key), plus
//!   `restore`/`unload` invoked from partition rebalance callbacks.
//! - **Changelog**: CRC-framed append-only file per partition; the
//!   authoritative record of every section.
//! - **Stores**: `ChangelogStateStore` (RocksDB + changelog) for
//!   deployments, `MemoryStateStore` for tests.

pub mod changelog;
pub mod error;
pub mod rocks;
pub mod store;

pub use changelog::Changelog;
pub use error::{Result, StateError};
pub use rocks::{ChangelogStateStore, StateStoreConfig};
pub use store::{MemoryStateStore, StateStore};
