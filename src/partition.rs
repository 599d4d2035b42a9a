//! Distribution of channel subscriptions across parallel tasks
//!
//! Partitioning happens once, when the connector produces its task configs.
//! Each item-type is split into balanced, order-preserving groups, and the
//! groups of all item-types are dealt out round-robin over the task indices so
//! that posts and comments end up interleaved rather than stacked onto the
//! first tasks.
//!
//! # Example
//!
//! ```
//! use streamtail::partition::group_partitions;
//!
//! let groups = group_partitions(&["a", "b", "c"], 2).unwrap();
//! assert_eq!(groups, vec![vec!["a", "b"], vec!["c"]]);
//! ```

use crate::error::{Error, Result};
use crate::types::{Channel, ItemType};
use std::collections::BTreeMap;

/// Split `elements` into at most `max_groups` contiguous groups
///
/// Group sizes differ by at most one, earlier groups taking the remainder,
/// and the input order is preserved within and across groups. Empty groups
/// are never returned, so an empty input yields no groups at all.
///
/// # Errors
/// Returns [`Error::Config`] if `max_groups` is zero.
pub fn group_partitions<T: Clone>(elements: &[T], max_groups: usize) -> Result<Vec<Vec<T>>> {
    if max_groups == 0 {
        return Err(Error::Config {
            message: "number of groups must be positive".to_string(),
            key: Some("max_tasks".to_string()),
        });
    }

    let num_groups = max_groups.min(elements.len());
    if num_groups == 0 {
        return Ok(Vec::new());
    }

    let per_group = elements.len() / num_groups;
    let leftover = elements.len() % num_groups;

    let mut groups = Vec::with_capacity(num_groups);
    let mut remaining = elements;
    for group in 0..num_groups {
        let size = if group < leftover {
            per_group + 1
        } else {
            per_group
        };
        let (head, tail) = remaining.split_at(size);
        groups.push(head.to_vec());
        remaining = tail;
    }

    Ok(groups)
}

/// Channels assigned to one task, per item-type
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaskAssignment {
    channels: BTreeMap<ItemType, Vec<Channel>>,
}

impl TaskAssignment {
    /// Channels of `item_type` this task reads (empty if it has no group)
    pub fn channels(&self, item_type: ItemType) -> &[Channel] {
        self.channels
            .get(&item_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the task reads nothing at all
    pub fn is_empty(&self) -> bool {
        self.channels.values().all(Vec::is_empty)
    }
}

/// Assign the channels of every item-type to at most `max_tasks` tasks
///
/// The number of tasks produced is `min(max_tasks, total channels)`. One
/// round-robin cursor runs across all item-types, so with two posts groups
/// and two comments groups over three tasks the assignment is
/// `[posts₀ + comments₁, posts₁, comments₀]`.
///
/// # Errors
/// Returns [`Error::Config`] if `max_tasks` is zero.
pub fn assign_tasks(
    streams: &[(ItemType, &[Channel])],
    max_tasks: usize,
) -> Result<Vec<TaskAssignment>> {
    if max_tasks == 0 {
        return Err(Error::Config {
            message: "max_tasks must be at least 1".to_string(),
            key: Some("max_tasks".to_string()),
        });
    }

    let total: usize = streams.iter().map(|(_, channels)| channels.len()).sum();
    let num_tasks = max_tasks.min(total);
    let mut tasks = vec![TaskAssignment::default(); num_tasks];
    if num_tasks == 0 {
        return Ok(tasks);
    }

    let mut task = 0;
    for (item_type, channels) in streams {
        for group in group_partitions(channels, max_tasks)? {
            tasks[task].channels.insert(*item_type, group);
            task = (task + 1) % num_tasks;
        }
    }

    Ok(tasks)
}
