//! Bounded set of creature ids the client has a full description for.

use std::collections::{HashMap, VecDeque};

use crate::types::CreatureId;

/// Outcome of [`KnownCreatures::remember`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remembered {
    /// The client already has this creature; send it by id.
    AlreadyKnown,
    /// Newly added without evicting anything.
    Added,
    /// Newly added; the client must drop `evicted` from its own cache.
    Replaced {
        evicted: CreatureId,
    },
}

/// FIFO cache of creature ids, mirroring the client's own creature table.
///
/// Insertion order is tracked in a queue of `(id, generation)` pairs. A
/// forgotten id leaves a stale entry behind that is skipped on eviction, so
/// [`forget`](Self::forget) stays amortised O(1). The queue is compacted once stale
/// entries outnumber live ones.
#[derive(Debug)]
pub struct KnownCreatures {
    capacity: usize,
    members: HashMap<CreatureId, u64>,
    order: VecDeque<(CreatureId, u64)>,
    next_generation: u64,
}

impl KnownCreatures {
    /// Create an empty cache. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            members: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            next_generation: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: CreatureId) -> bool {
        self.members.contains_key(&id)
    }

    /// Record that the client is about to receive `id`.
    ///
    /// At capacity the oldest remembered id is evicted and reported so the
    /// full description can tell the client which entry to replace.
    pub fn remember(&mut self, id: CreatureId) -> Remembered {
        if self.contains(id) {
            return Remembered::AlreadyKnown;
        }

        let outcome = if self.members.len() >= self.capacity {
            let Some(evicted) = self.evict_oldest() else {
                unreachable!(
                    "known creature queue lost track of {} members",
                    self.members.len()
                );
            };
            Remembered::Replaced { evicted }
        } else {
            Remembered::Added
        };

        let generation = self.next_generation;
        self.next_generation += 1;
        self.members.insert(id, generation);
        self.order.push_back((id, generation));
        self.compact_if_sparse();
        outcome
    }

    /// Drop `id` after the creature was destroyed. Returns whether it was known.
    pub fn forget(&mut self, id: CreatureId) -> bool {
        let removed = self.members.remove(&id).is_some();
        if removed {
            self.compact_if_sparse();
        }
        removed
    }

    /// Forget everything, e.g. after a teleport to another map.
    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }

    /// Known ids, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = CreatureId> + '_ {
        self.order
            .iter()
            .filter(|(id, generation)| self.members.get(id) == Some(generation))
            .map(|(id, _)| *id)
    }

    fn evict_oldest(&mut self) -> Option<CreatureId> {
        while let Some((id, generation)) = self.order.pop_front() {
            if self.members.get(&id) == Some(&generation) {
                self.members.remove(&id);
                return Some(id);
            }
        }
        None
    }

    fn compact_if_sparse(&mut self) {
        if self.order.len() <= self.capacity * 2 {
            return;
        }
        let members = &self.members;
        self.order
            .retain(|(id, generation)| members.get(id) == Some(generation));
    }
}
