//! Per-partition changelog.
//!
//! Every state mutation is appended here before it reaches the local
//! store, making the changelog the authoritative record of a partition's
//! section. On partition assignment the section is rebuilt by replaying
//! the file from the start.
//!
//! ## File format
//!
//! One file per partition (`changelog-{partition}.log`), a sequence of
//! CRC-checked frames:
//!
//! ```text
//! ┌─────────────┬───────────┬─────────────────────────┐
//! │ Payload Len │ CRC32     │ Payload (bincode entry) │
//! │ (4 bytes)   │ (4 bytes) │ (N bytes)               │
//! └─────────────┴───────────┴─────────────────────────┘
//! ```
//!
//! A torn tail (truncated frame or checksum mismatch) ends replay at the
//! last intact frame. Entries past a torn frame belong to writes whose
//! input offsets were never committed, so they are re-derived by
//! re-processing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{Result, StateError};

const FRAME_HEADER_LEN: usize = 8;

/// A single logical changelog entry: the latest state for a key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangelogEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Append-only changelog for a single partition.
pub struct Changelog {
    partition: u32,
    path: PathBuf,
    file: Option<File>,
}

impl Changelog {
    /// Open (or create) the changelog for a partition under `dir`.
    pub async fn open(dir: impl AsRef<Path>, partition: u32) -> Result<Self> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(format!("changelog-{partition}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!(partition, path = %path.display(), "changelog opened");
        Ok(Self {
            partition,
            path,
            file: Some(file),
        })
    }

    /// The partition this changelog belongs to.
    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Append an entry and sync it to disk.
    pub async fn append(&mut self, key: &str, value: &[u8]) -> Result<()> {
        let entry = ChangelogEntry {
            key: key.to_string(),
            value: value.to_vec(),
        };
        let payload = bincode::serialize(&entry)
            .map_err(|e| StateError::Serialization(format!("failed to encode entry: {e}")))?;

        let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        frame.extend_from_slice(&payload);

        let file = self.file.as_mut().ok_or_else(|| {
            StateError::Changelog(format!(
                "changelog for partition {} is closed",
                self.partition
            ))
        })?;
        file.write_all(&frame).await?;
        file.sync_data().await?;
        Ok(())
    }

    /// Replay all intact entries from the start of the file.
    ///
    /// Later entries for the same key supersede earlier ones; the caller
    /// applies them in order. Replay stops cleanly at a torn or corrupt
    /// tail.
    pub async fn replay(&self) -> Result<Vec<ChangelogEntry>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        let mut pos = 0usize;
        while pos + FRAME_HEADER_LEN <= raw.len() {
            let len = u32::from_le_bytes([raw[pos], raw[pos + 1], raw[pos + 2], raw[pos + 3]])
                as usize;
            let crc = u32::from_le_bytes([raw[pos + 4], raw[pos + 5], raw[pos + 6], raw[pos + 7]]);
            let start = pos + FRAME_HEADER_LEN;

            if start + len > raw.len() {
                warn!(
                    partition = self.partition,
                    offset = pos,
                    "torn changelog tail, stopping replay"
                );
                break;
            }
            let payload = &raw[start..start + len];
            if crc32fast::hash(payload) != crc {
                warn!(
                    partition = self.partition,
                    offset = pos,
                    "changelog checksum mismatch, stopping replay"
                );
                break;
            }
            let entry: ChangelogEntry = bincode::deserialize(payload).map_err(|e| {
                StateError::Serialization(format!("failed to decode entry: {e}"))
            })?;
            entries.push(entry);
            pos = start + len;
        }

        if pos < raw.len() {
            warn!(
                partition = self.partition,
                trailing_bytes = raw.len() - pos,
                "ignored trailing changelog bytes"
            );
        }
        Ok(entries)
    }

    /// Close the file handle. Subsequent appends fail until reopened.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_data().await?;
        }
        Ok(())
    }
}
