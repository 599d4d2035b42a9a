//! Offset snapshot and the "is this item new?" decision.

use crate::types::{Offset, PartitionKey};
use std::collections::HashMap;

/// Offsets loaded from the store once, when a task starts
///
/// The snapshot is never updated while readers run: every item is judged
/// against the offsets that were committed before the task started.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetSnapshot {
    offsets: HashMap<PartitionKey, Offset>,
}

impl OffsetSnapshot {
    /// Create a snapshot from stored offsets
    pub fn new(offsets: HashMap<PartitionKey, Offset>) -> Self {
        Self { offsets }
    }

    /// Stored offset for a partition, if one was ever committed
    pub fn get(&self, key: &PartitionKey) -> Option<Offset> {
        self.offsets.get(key).copied()
    }

    /// Number of partitions with a stored offset
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    /// Whether no partition has a stored offset
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Whether an item created at `created` in `key` has not been emitted before
    ///
    /// Items of partitions without a stored offset are always new; otherwise
    /// the item must be strictly newer than the stored offset.
    pub fn is_new(&self, key: &PartitionKey, created: Offset) -> bool {
        match self.offsets.get(key) {
            Some(stored) => created > *stored,
            None => true,
        }
    }
}

impl FromIterator<(PartitionKey, Offset)> for OffsetSnapshot {
    fn from_iter<I: IntoIterator<Item = (PartitionKey, Offset)>>(iter: I) -> Self {
        Self {
            offsets: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemType;

    #[test]
    fn equal_timestamp_is_not_new() {
        let key = PartitionKey::new(ItemType::Posts, "a");
        let snapshot: OffsetSnapshot = [(key.clone(), Offset(100))].into_iter().collect();

        assert!(!snapshot.is_new(&key, Offset(100)));
        assert!(!snapshot.is_new(&key, Offset(99)));
        assert!(snapshot.is_new(&key, Offset(101)));
    }

    #[test]
    fn missing_offset_accepts_everything() {
        let snapshot = OffsetSnapshot::default();

        assert!(snapshot.is_new(&PartitionKey::new(ItemType::Posts, "a"), Offset(1)));
        assert!(snapshot.is_new(&PartitionKey::new(ItemType::Posts, "a"), Offset(i64::MIN)));
    }

    #[test]
    fn offsets_are_scoped_by_item_type() {
        let posts_key = PartitionKey::new(ItemType::Posts, "a");
        let comments_key = PartitionKey::new(ItemType::Comments, "a");
        let snapshot: OffsetSnapshot = [(posts_key.clone(), Offset(500))].into_iter().collect();

        assert!(!snapshot.is_new(&posts_key, Offset(200)));
        assert!(snapshot.is_new(&comments_key, Offset(200)));
        assert_eq!(snapshot.get(&comments_key), None);
        assert_eq!(snapshot.len(), 1);
    }
}
