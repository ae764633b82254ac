//! State store trait and the in-memory implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

/// Abstraction over the partition-local state store.
///
/// Sections are scoped by partition and follow partition ownership: a
/// worker calls `restore` when a partition is assigned to it and `unload`
/// when the partition is revoked. Within a section, access is
/// single-writer: the worker that owns the partition.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Retrieve the state stored for a key, if any.
    async fn get(&self, partition: u32, key: &str) -> Result<Option<Vec<u8>>>;

    /// Upsert the state for a key. The write is durable (changelogged)
    /// when this returns, making the triggering input offset eligible for
    /// commit.
    async fn put(&self, partition: u32, key: &str, value: &[u8]) -> Result<()>;

    /// Rebuild the partition's section from its changelog. Returns the
    /// number of entries in the section after the rebuild.
    async fn restore(&self, partition: u32) -> Result<u64>;

    /// Release the partition's section (close changelog handles, drop
    /// caches). The data itself stays recoverable via `restore`.
    async fn unload(&self, partition: u32) -> Result<()>;

    /// All keys currently in a section (diagnostics).
    async fn keys(&self, partition: u32) -> Result<Vec<String>>;
}

/// A simple in-memory [`StateStore`] for tests and ephemeral runs.
///
/// Has no changelog; `restore` is a no-op that reports the section size.
pub struct MemoryStateStore {
    /// partition -> (key -> value)
    sections: RwLock<HashMap<u32, HashMap<String, Vec<u8>>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            sections: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, partition: u32, key: &str) -> Result<Option<Vec<u8>>> {
        let sections = self.sections.read().await;
        Ok(sections
            .get(&partition)
            .and_then(|section| section.get(key))
            .cloned())
    }

    async fn put(&self, partition: u32, key: &str, value: &[u8]) -> Result<()> {
        let mut sections = self.sections.write().await;
        sections
            .entry(partition)
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn restore(&self, partition: u32) -> Result<u64> {
        let sections = self.sections.read().await;
        Ok(sections
            .get(&partition)
            .map(|section| section.len() as u64)
            .unwrap_or(0))
    }

    async fn unload(&self, _partition: u32) -> Result<()> {
        Ok(())
    }

    async fn keys(&self, partition: u32) -> Result<Vec<String>> {
        let sections = self.sections.read().await;
        Ok(sections
            .get(&partition)
            .map(|section| section.keys().cloned().collect())
            .unwrap_or_default())
    }
}
