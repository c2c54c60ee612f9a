//! Phases: snapshots of the six index roots, kept alive by tokens.
//!
//! The registry is an arena keyed by generation. Exactly one generation may
//! be current (the one being mutated); any other generation survives only
//! while a [`PhaseToken`] refers to it. Index files ask the registry for the
//! roots of every surviving generation when they sweep for free pages.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::statement::ordering::IndexOrder;
use crate::storage::page::PageId;

/// Generation number of a phase in the registry.
pub type Generation = u64;

/// Root of one index in one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexRoot {
    /// Root page of the tree, `0` when empty.
    pub root: PageId,
    /// Number of statements in the tree.
    pub count: u64,
}

/// The roots of all six indexes, in [`IndexOrder::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseRoots(pub [IndexRoot; 6]);

impl PhaseRoots {
    #[must_use]
    pub const fn get(&self, order: IndexOrder) -> IndexRoot {
        self.0[order.position()]
    }

    pub const fn set(&mut self, order: IndexOrder, root: IndexRoot) {
        self.0[order.position()] = root;
    }

    /// Statement count, taken from the first index.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.0[0].count
    }
}

struct Entry {
    roots: PhaseRoots,
    refs: usize,
}

#[derive(Default)]
struct Arena {
    entries: BTreeMap<Generation, Entry>,
    next_generation: Generation,
    current: Option<Generation>,
}

impl Arena {
    fn insert(&mut self, roots: PhaseRoots, refs: usize) -> Generation {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.entries.insert(generation, Entry { roots, refs });
        generation
    }

    fn drop_if_unused(&mut self, generation: Generation) {
        let unused = self
            .entries
            .get(&generation)
            .is_some_and(|entry| entry.refs == 0 && self.current != Some(generation));
        if unused {
            self.entries.remove(&generation);
            debug!(generation, "phase reclaimed");
        }
    }
}

/// Arena of live phases for one statement store.
#[derive(Default)]
pub struct PhaseRegistry {
    arena: Mutex<Arena>,
}

impl PhaseRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // No arena operation panics part way, so a poisoned arena is still whole.
    fn arena(&self) -> MutexGuard<'_, Arena> {
        self.arena.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make a new generation with `roots` the current one.
    ///
    /// The previous current generation survives only if it has tokens.
    pub fn create_current(&self, roots: PhaseRoots) -> Generation {
        let mut arena = self.arena();
        let previous = arena.current.take();
        let generation = arena.insert(roots, 0);
        arena.current = Some(generation);
        if let Some(previous) = previous {
            arena.drop_if_unused(previous);
        }
        debug!(generation, ?previous, "new current phase");
        generation
    }

    /// Record the roots of the current generation after a mutation.
    pub fn update(&self, generation: Generation, roots: PhaseRoots) {
        if let Some(entry) = self.arena().entries.get_mut(&generation) {
            entry.roots = roots;
        }
    }

    /// Stop treating any generation as current.
    pub fn retire_current(&self) {
        let mut arena = self.arena();
        if let Some(previous) = arena.current.take() {
            arena.drop_if_unused(previous);
        }
    }

    /// Forget every generation. Outstanding tokens become inert.
    pub fn reset(&self) {
        let mut arena = self.arena();
        arena.entries.clear();
        arena.current = None;
    }

    /// Take a token on an existing generation.
    pub fn acquire(self: &Arc<Self>, generation: Generation) -> Option<PhaseToken> {
        let mut arena = self.arena();
        let entry = arena.entries.get_mut(&generation)?;
        entry.refs += 1;
        Some(PhaseToken {
            registry: Arc::clone(self),
            generation,
            roots: entry.roots,
        })
    }

    /// Register a phase that is never current, such as one read back from
    /// the metaroot, and take a token on it.
    pub fn acquire_snapshot(self: &Arc<Self>, roots: PhaseRoots) -> PhaseToken {
        let generation = self.arena().insert(roots, 1);
        PhaseToken {
            registry: Arc::clone(self),
            generation,
            roots,
        }
    }

    /// True if any token refers to `generation`.
    #[must_use]
    pub fn is_in_use(&self, generation: Generation) -> bool {
        self.arena()
            .entries
            .get(&generation)
            .is_some_and(|entry| entry.refs > 0)
    }

    /// Root pages of `order` across every surviving generation.
    #[must_use]
    pub fn live_roots(&self, order: IndexOrder) -> Vec<PageId> {
        let mut roots: Vec<PageId> = self
            .arena()
            .entries
            .values()
            .map(|entry| entry.roots.get(order).root)
            .filter(|root| *root != 0)
            .collect();
        roots.sort_unstable();
        roots.dedup();
        roots
    }

    /// Number of surviving generations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.arena().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, generation: Generation) {
        let mut arena = self.arena();
        if let Some(entry) = arena.entries.get_mut(&generation) {
            entry.refs = entry.refs.saturating_sub(1);
            arena.drop_if_unused(generation);
        }
    }
}

impl std::fmt::Debug for PhaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let arena = self.arena();
        f.debug_struct("PhaseRegistry")
            .field("generations", &arena.entries.keys().collect::<Vec<_>>())
            .field("current", &arena.current)
            .finish()
    }
}

/// A counted reference to one phase. Dropping it releases the reference.
pub struct PhaseToken {
    registry: Arc<PhaseRegistry>,
    generation: Generation,
    roots: PhaseRoots,
}

impl PhaseToken {
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// The roots of the phase as they were when the token was taken.
    #[must_use]
    pub const fn roots(&self) -> &PhaseRoots {
        &self.roots
    }
}

impl Clone for PhaseToken {
    fn clone(&self) -> Self {
        let mut arena = self.registry.arena();
        if let Some(entry) = arena.entries.get_mut(&self.generation) {
            entry.refs += 1;
        }
        drop(arena);
        Self {
            registry: Arc::clone(&self.registry),
            generation: self.generation,
            roots: self.roots,
        }
    }
}

impl Drop for PhaseToken {
    fn drop(&mut self) {
        self.registry.release(self.generation);
    }
}

impl std::fmt::Debug for PhaseToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseToken")
            .field("generation", &self.generation)
            .field("roots", &self.roots)
            .finish()
    }
}
