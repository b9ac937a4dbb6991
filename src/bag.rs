//! A multiset of ids used to tally the outcome of one poll.

use crate::zfx_id::Id;

use std::collections::{hash_map::Entry, HashMap};

/// Tally of votes returned by one round of sampling.
///
/// Each vote names the id of a transaction the sampled validator prefers.
/// The bag carries a threshold; [Bag::threshold] yields the ids whose tally
/// reached it. Iteration follows first-insertion order so that the outcome
/// of a poll is reproducible within a process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bag {
    counts: HashMap<Id, usize>,
    // Maintains first-insertion order for deterministic iteration.
    order: Vec<Id>,
    threshold: usize,
}

impl Bag {
    pub fn new() -> Self {
        Bag { counts: HashMap::default(), order: vec![], threshold: 1 }
    }

    /// Record a single vote for `id`.
    pub fn add(&mut self, id: Id) {
        self.add_count(id, 1);
    }

    /// Record `n` votes for `id`.
    pub fn add_count(&mut self, id: Id, n: usize) {
        if n == 0 {
            return;
        }
        match self.counts.entry(id) {
            Entry::Occupied(mut o) => {
                *o.get_mut() += n;
            }
            Entry::Vacant(v) => {
                v.insert(n);
                self.order.push(id);
            }
        }
    }

    /// Set the tally required for an id to appear in [Bag::threshold].
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold;
    }

    /// Votes recorded for `id`.
    pub fn count(&self, id: &Id) -> usize {
        self.counts.get(id).cloned().unwrap_or(0)
    }

    /// Total number of votes in the bag.
    pub fn len(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// The ids whose tally met the threshold, in first-insertion order.
    /// This is a derived view, computed on demand.
    pub fn threshold(&self) -> Vec<Id> {
        self.order.iter().filter(|&id| self.count(id) >= self.threshold).cloned().collect()
    }
}

impl Default for Bag {
    fn default() -> Self {
        Bag::new()
    }
}
