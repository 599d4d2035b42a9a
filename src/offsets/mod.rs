//! Offset persistence
//!
//! The engine itself only ever *reads* offsets, once, when a task starts.
//! Writing them back is the host's job and happens after records have reached
//! the sink: every [`OutputRecord`] carries its own `(key, offset)` position,
//! and [`OffsetStore::commit_records`] folds a delivered batch into one
//! high-water mark per partition.
//!
//! Commits are max-merges, so a host that persists batches out of order can
//! never move a partition's offset backwards.
//!
//! ## Implementations
//!
//! - [`MemoryOffsetStore`]: process-local map, for embedding and tests
//! - [`SqliteOffsetStore`]: SQLite file, survives restarts

use crate::dedup::OffsetSnapshot;
use crate::error::Result;
use crate::types::{Offset, OutputRecord, PartitionKey};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};

mod memory;
mod sqlite;

pub use memory::MemoryOffsetStore;
pub use sqlite::{OffsetRow, SqliteOffsetStore};

/// Persistent mapping from partition key to last emitted offset
#[async_trait]
pub trait OffsetStore: Send + Sync {
    /// Load the stored offsets of `keys`
    ///
    /// Keys without a stored offset are simply absent from the snapshot.
    async fn snapshot(&self, keys: &HashSet<PartitionKey>) -> Result<OffsetSnapshot>;

    /// Record that everything in `key` up to and including `offset` was delivered
    ///
    /// Implementations must keep the larger of the stored and the new offset.
    async fn commit(&self, key: &PartitionKey, offset: Offset) -> Result<()>;

    /// Commit the positions of a batch of delivered records
    async fn commit_records(&self, records: &[OutputRecord]) -> Result<()> {
        for (key, offset) in high_water_marks(records) {
            self.commit(&key, offset).await?;
        }
        Ok(())
    }
}

/// Highest offset per partition among `records`
pub fn high_water_marks(records: &[OutputRecord]) -> BTreeMap<PartitionKey, Offset> {
    let mut marks: BTreeMap<PartitionKey, Offset> = BTreeMap::new();
    for record in records {
        let (key, offset) = record.position();
        marks
            .entry(key.clone())
            .and_modify(|current| *current = (*current).max(offset))
            .or_insert(offset);
    }
    marks
}
