//! In-process offset store.

use crate::dedup::OffsetSnapshot;
use crate::error::Result;
use crate::types::{Offset, PartitionKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;

use super::OffsetStore;

/// Offset store backed by a map held in memory
///
/// Offsets are lost when the process exits; use [`super::SqliteOffsetStore`]
/// when restarts must not re-emit items.
#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    offsets: RwLock<HashMap<PartitionKey, Offset>>,
}

impl MemoryOffsetStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-seeded with offsets
    pub fn with_offsets(offsets: impl IntoIterator<Item = (PartitionKey, Offset)>) -> Self {
        Self {
            offsets: RwLock::new(offsets.into_iter().collect()),
        }
    }

    /// Current offset of a partition
    pub async fn get(&self, key: &PartitionKey) -> Option<Offset> {
        self.offsets.read().await.get(key).copied()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn snapshot(&self, keys: &HashSet<PartitionKey>) -> Result<OffsetSnapshot> {
        let offsets = self.offsets.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| offsets.get(key).map(|offset| (key.clone(), *offset)))
            .collect())
    }

    async fn commit(&self, key: &PartitionKey, offset: Offset) -> Result<()> {
        let mut offsets = self.offsets.write().await;
        offsets
            .entry(key.clone())
            .and_modify(|current| *current = (*current).max(offset))
            .or_insert(offset);
        Ok(())
    }
}
