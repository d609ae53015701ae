//! Merging groups down to a core count

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

use crate::error::{SchedulerError, SchedulerResult};

/// How groups are merged to fit the available cores
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStrategy {
    /// Leave groups as they are
    #[default]
    Naive,
    /// Fill each of the largest groups with the smallest ones up to
    /// `total / cores`, then fold any overflow into a single group
    MaxAddMins,
    /// Repeatedly merge the two smallest groups
    MinsAddUp,
}

/// A group that can be merged with another
pub trait Mergeable {
    /// Size used for balancing
    fn weight(&self) -> usize;

    /// Append `other` to `self`
    fn absorb(&mut self, other: Self);
}

impl<T> Mergeable for Vec<T> {
    fn weight(&self) -> usize {
        self.len()
    }

    fn absorb(&mut self, other: Self) {
        self.extend(other);
    }
}

/// Merge `groups` down to at most `cores` groups using `strategy`
pub fn rebalance<G: Mergeable>(
    strategy: GroupStrategy,
    cores: usize,
    groups: Vec<G>,
) -> SchedulerResult<Vec<G>> {
    let cores = NonZeroUsize::new(cores).ok_or(SchedulerError::InvalidCoreCount(cores))?;
    Ok(merge(strategy, cores, groups))
}

pub(crate) fn merge<G: Mergeable>(strategy: GroupStrategy, cores: NonZeroUsize, groups: Vec<G>) -> Vec<G> {
    match strategy {
        GroupStrategy::Naive => groups,
        GroupStrategy::MaxAddMins => max_add_mins(cores.get(), groups),
        GroupStrategy::MinsAddUp => mins_add_up(cores.get(), groups),
    }
}

fn sorted_descending<G: Mergeable>(mut groups: Vec<G>) -> Vec<G> {
    groups.sort_by(|a, b| b.weight().cmp(&a.weight()));
    groups
}

fn mins_add_up<G: Mergeable>(cores: usize, groups: Vec<G>) -> Vec<G> {
    if groups.len() <= cores {
        return groups;
    }
    let mut sorted = sorted_descending(groups);
    while sorted.len() > cores {
        let (Some(smallest), Some(mut merged)) = (sorted.pop(), sorted.pop()) else {
            break;
        };
        merged.absorb(smallest);
        let weight = merged.weight();
        let at = sorted
            .iter()
            .rposition(|g| g.weight() >= weight)
            .map_or(0, |i| i + 1);
        sorted.insert(at, merged);
    }
    sorted
}

fn max_add_mins<G: Mergeable>(cores: usize, groups: Vec<G>) -> Vec<G> {
    if groups.is_empty() {
        return groups;
    }
    let total: usize = groups.iter().map(Mergeable::weight).sum();
    let threshold = total / cores;

    let mut queue: VecDeque<G> = sorted_descending(groups).into();
    let mut merged = Vec::with_capacity(cores);
    while let Some(mut current) = queue.pop_front() {
        while queue
            .back()
            .is_some_and(|smallest| current.weight() + smallest.weight() <= threshold)
        {
            if let Some(smallest) = queue.pop_back() {
                current.absorb(smallest);
            }
        }
        merged.push(current);
    }

    if merged.len() <= cores {
        return merged;
    }
    merged.sort_by_key(Mergeable::weight);
    let rest = merged.split_off(merged.len() - cores + 1);
    let mut folded = merged.into_iter();
    let mut result = Vec::with_capacity(cores);
    if let Some(mut head) = folded.next() {
        for group in folded {
            head.absorb(group);
        }
        result.push(head);
    }
    result.extend(rest);
    result
}
