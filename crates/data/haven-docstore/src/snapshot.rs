//! Snapshot persistence
//!
//! Stores every collection to disk as JSON so a memory-backed CLI keeps its
//! state between runs.

use haven_core::{FeedItem, Record, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::MemoryStore;

const SNAPSHOT_VERSION: u32 = 1;

/// Serializable content of a store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Version for migration support
    pub version: u32,

    /// Documents per collection
    pub collections: BTreeMap<String, Vec<FeedItem>>,
}

impl StoreSnapshot {
    pub fn new(collections: BTreeMap<String, Vec<FeedItem>>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            collections,
        }
    }
}

impl Default for StoreSnapshot {
    fn default() -> Self {
        Self::new(BTreeMap::new())
    }
}

/// Seed file: collection name to a list of flat JSON records
pub type SeedFile = BTreeMap<String, Vec<serde_json::Value>>;

/// Parse a seed file into records per collection
pub fn parse_seed(content: &str) -> Result<BTreeMap<String, Vec<Record>>> {
    let seed: SeedFile = serde_json::from_str(content)?;
    seed.into_iter()
        .map(|(collection, rows)| {
            let records = rows
                .into_iter()
                .map(Record::from_json)
                .collect::<Result<Vec<_>>>()?;
            Ok((collection, records))
        })
        .collect()
}

/// Snapshot file on disk
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the store; a missing file yields an empty store
    pub fn load(&self) -> Result<MemoryStore> {
        if !self.path.exists() {
            tracing::info!("No snapshot at {}, starting empty", self.path.display());
            return Ok(MemoryStore::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded snapshot v{} with {} collections from {}",
            snapshot.version,
            snapshot.collections.len(),
            self.path.display()
        );

        Ok(MemoryStore::from_snapshot(snapshot))
    }

    /// Save the store (write to temp file, then rename)
    pub fn save(&self, store: &MemoryStore) -> Result<()> {
        let content = serde_json::to_string_pretty(&store.snapshot())?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let temp_path = self.path.with_extension("json.tmp");
        std::fs::write(&temp_path, &content)?;
        std::fs::rename(&temp_path, &self.path)?;

        tracing::debug!("Saved snapshot to {}", self.path.display());
        Ok(())
    }
}
