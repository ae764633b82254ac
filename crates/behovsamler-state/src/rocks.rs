//! RocksDB-backed state store with a changelog tee.
//!
//! Provides the persistent [`StateStore`] used by deployments. Sections
//! are isolated per partition with a key-prefix scheme
//! (`{partition}\x00{key}`). Every `put` is appended to the partition's
//! changelog and fsynced before it reaches RocksDB, so the changelog is
//! authoritative: `restore` clears the section and replays the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{Options, DB};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::changelog::Changelog;
use crate::error::{Result, StateError};
use crate::store::StateStore;

/// Configuration for a [`ChangelogStateStore`].
#[derive(Debug, Clone)]
pub struct StateStoreConfig {
    /// Directory holding the RocksDB database and the changelog files.
    pub state_dir: String,
    /// Create the directory if it does not exist.
    pub create_if_missing: bool,
    /// Maximum number of open files RocksDB may use.
    pub max_open_files: Option<i32>,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            state_dir: "./data/state".to_string(),
            create_if_missing: true,
            max_open_files: Some(256),
        }
    }
}

/// Build a store key by prefixing the partition section: `{partition}\x00{key}`.
fn section_key(partition: u32, key: &str) -> Vec<u8> {
    let section = partition.to_string();
    let mut prefixed = Vec::with_capacity(section.len() + 1 + key.len());
    prefixed.extend_from_slice(section.as_bytes());
    prefixed.push(0x00);
    prefixed.extend_from_slice(key.as_bytes());
    prefixed
}

fn section_prefix(partition: u32) -> Vec<u8> {
    let section = partition.to_string();
    let mut prefix = Vec::with_capacity(section.len() + 1);
    prefix.extend_from_slice(section.as_bytes());
    prefix.push(0x00);
    prefix
}

/// A persistent, changelog-backed [`StateStore`].
pub struct ChangelogStateStore {
    db: Arc<RwLock<DB>>,
    dir: PathBuf,
    changelogs: Mutex<HashMap<u32, Changelog>>,
}

impl ChangelogStateStore {
    /// Open (or create) a store under `config.state_dir`.
    pub fn open(config: &StateStoreConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.state_dir);
        if config.create_if_missing {
            std::fs::create_dir_all(&dir)?;
        }

        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        if let Some(max_files) = config.max_open_files {
            opts.set_max_open_files(max_files);
        }

        let db_path = dir.join("store");
        let db = DB::open(&opts, &db_path).map_err(|e| {
            StateError::Store(format!(
                "failed to open RocksDB at {}: {e}",
                db_path.display()
            ))
        })?;

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            dir,
            changelogs: Mutex::new(HashMap::new()),
        })
    }

    /// Open a store at the given path with default options.
    pub fn open_default(path: impl AsRef<Path>) -> Result<Self> {
        let config = StateStoreConfig {
            state_dir: path.as_ref().to_string_lossy().to_string(),
            ..Default::default()
        };
        Self::open(&config)
    }

    /// Delete every key in a partition's section.
    async fn clear_section(&self, partition: u32) -> Result<()> {
        let prefix = section_prefix(partition);
        let db = self.db.write().await;
        let iter = db.prefix_iterator(&prefix);
        let mut doomed = Vec::new();
        for item in iter {
            let (raw_key, _) =
                item.map_err(|e| StateError::Store(format!("RocksDB iterator error: {e}")))?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            doomed.push(raw_key.to_vec());
        }
        for raw_key in doomed {
            db.delete(&raw_key)
                .map_err(|e| StateError::Store(format!("RocksDB delete error: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl StateStore for ChangelogStateStore {
    async fn get(&self, partition: u32, key: &str) -> Result<Option<Vec<u8>>> {
        let prefixed = section_key(partition, key);
        let db = self.db.read().await;
        db.get(&prefixed)
            .map_err(|e| StateError::Store(format!("RocksDB get error: {e}")))
    }

    async fn put(&self, partition: u32, key: &str, value: &[u8]) -> Result<()> {
        // Changelog first: once the append is synced the mutation survives
        // a crash even if the RocksDB write below never happens.
        {
            let mut changelogs = self.changelogs.lock().await;
            if !changelogs.contains_key(&partition) {
                let changelog = Changelog::open(&self.dir, partition).await?;
                changelogs.insert(partition, changelog);
            }
            let changelog = changelogs
                .get_mut(&partition)
                .expect("changelog inserted above");
            changelog.append(key, value).await?;
        }

        let prefixed = section_key(partition, key);
        let db = self.db.write().await;
        db.put(&prefixed, value)
            .map_err(|e| StateError::Store(format!("RocksDB put error: {e}")))
    }

    async fn restore(&self, partition: u32) -> Result<u64> {
        let entries = {
            let mut changelogs = self.changelogs.lock().await;
            if !changelogs.contains_key(&partition) {
                let changelog = Changelog::open(&self.dir, partition).await?;
                changelogs.insert(partition, changelog);
            }
            changelogs
                .get(&partition)
                .expect("changelog inserted above")
                .replay()
                .await?
        };

        self.clear_section(partition).await?;

        // Later entries supersede earlier ones for the same key.
        let mut section: HashMap<String, Vec<u8>> = HashMap::new();
        for entry in entries {
            section.insert(entry.key, entry.value);
        }

        let restored = section.len() as u64;
        {
            let db = self.db.write().await;
            for (key, value) in &section {
                let prefixed = section_key(partition, key);
                db.put(&prefixed, value)
                    .map_err(|e| StateError::Store(format!("RocksDB put error: {e}")))?;
            }
        }

        info!(partition, entries = restored, "state section restored from changelog");
        Ok(restored)
    }

    async fn unload(&self, partition: u32) -> Result<()> {
        let mut changelogs = self.changelogs.lock().await;
        if let Some(mut changelog) = changelogs.remove(&partition) {
            changelog.close().await?;
            debug!(partition, "state section unloaded");
        }
        Ok(())
    }

    async fn keys(&self, partition: u32) -> Result<Vec<String>> {
        let prefix = section_prefix(partition);
        let db = self.db.read().await;
        let iter = db.prefix_iterator(&prefix);
        let mut keys = Vec::new();
        for item in iter {
            let (raw_key, _) =
                item.map_err(|e| StateError::Store(format!("RocksDB iterator error: {e}")))?;
            if !raw_key.starts_with(&prefix) {
                break;
            }
            keys.push(String::from_utf8_lossy(&raw_key[prefix.len()..]).to_string());
        }
        Ok(keys)
    }
}
