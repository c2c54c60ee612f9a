//! The statement store: six index files kept in lock-step, phases, and the
//! prepare/commit/rollback/recover protocol over the metaroot.
//!
//! # Phases
//!
//! All reads and writes go to the current phase. A read takes a token on
//! it and clears the dirty flag; the next write then sees the phase in use
//! and clones it first, so the reader keeps its snapshot. `prepare` records
//! the current phase into the free metaroot slot and moves writes to a fresh
//! clone; `commit` invalidates the slot of the previous phase and keeps the
//! recorded one as the committed phase.
//!
//! # Metaroot protocol
//!
//! 1. Force every index file.
//! 2. Write the free slot with its valid flag clear, then force.
//! 3. Set the valid flag, then force.
//!
//! A crash before step 3 completes leaves the old slot as the only valid one.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::statement::error::StoreError;
use crate::statement::ordering::{IndexOrder, Mask, mask_for, mask_of};
use crate::statement::phase::{Generation, PhaseRegistry, PhaseRoots, PhaseToken};
use crate::statement::read_only::ReadOnlyStatementStore;
use crate::statement::tuples::{StoreTuples, Tuples};
use crate::storage::btree::NodeLimits;
use crate::storage::index_file::lower_bound;
use crate::storage::metaroot::{Metaroot, MetarootSlot, MetarootStatus, SLOT_COUNT};
use crate::storage::{FileProvider, IndexFile, StorageProvider, StoreLock};
use crate::types::{NONE, NodeId, Quad};

/// Stores with at most this many statements print them in `Display`.
const DISPLAY_LIMIT: u64 = 32;

/// How to open a store through a [`StorageProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    /// Base file name; files are `<name>.g`, `<name>.g_0123` and so on.
    pub name: String,
    pub limits: NodeLimits,
}

impl StoreOptions {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            limits: NodeLimits::default(),
        }
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: NodeLimits) -> Self {
        self.limits = limits;
        self
    }
}

impl From<&StoreConfig> for StoreOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            name: config.name.clone(),
            limits: config
                .max_node_entries
                .map_or_else(NodeLimits::default, NodeLimits::with_max_entries),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CurrentPhase {
    generation: Generation,
    roots: PhaseRoots,
}

struct StoreState {
    metaroot: Metaroot,
    lock: Option<StoreLock>,
    wrong_file_version: bool,
    current: Option<CurrentPhase>,
    /// Set when a phase is created; cleared when a reader takes a token.
    dirty: bool,
    committed: Option<PhaseToken>,
    recording: Option<PhaseToken>,
    prepared: bool,
    /// Slot holding the last prepared phase.
    phase_index: usize,
    phase_number: u32,
}

/// Everything a store and its read-only views share.
pub(crate) struct StoreShared {
    state: Mutex<StoreState>,
    pub(crate) registry: Arc<PhaseRegistry>,
    pub(crate) indexes: [Arc<IndexFile>; 6],
    provider: Arc<dyn StorageProvider>,
    name: String,
}

/// A persistent set of quads indexed under six column orderings.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone)]
pub struct StatementStore {
    shared: Arc<StoreShared>,
}

impl StatementStore {
    /// Open the store described by `config` in its directory on disk.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let provider = FileProvider::new(&config.directory)
            .map_err(|e| StoreError::io(format!("create {}", config.directory.display()), e))?;
        Self::open_with(Arc::new(provider), StoreOptions::from(config))
    }

    /// Open a store, creating its files if missing.
    ///
    /// The store has no current phase until [`Self::clear`] or
    /// [`Self::select_phase`] is called.
    pub fn open_with(
        provider: Arc<dyn StorageProvider>,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let name = options.name;
        let lock_name = format!("{name}.g.lock");
        let lock = provider
            .lock(&lock_name)
            .map_err(|e| StoreError::io(format!("lock {lock_name}"), e))?;

        let metaroot_name = format!("{name}.g");
        let storage = provider
            .open(&metaroot_name)
            .map_err(|e| StoreError::io(format!("open {metaroot_name}"), e))?;
        let mut metaroot = Metaroot::new(storage);
        let wrong_file_version = metaroot
            .status()
            .map_err(|e| StoreError::io(format!("read {metaroot_name}"), e))?
            == MetarootStatus::Incompatible;

        let registry = Arc::new(PhaseRegistry::new());
        let mut indexes = Vec::with_capacity(IndexOrder::ALL.len());
        for order in IndexOrder::ALL {
            let file_name = index_file_name(&name, order);
            let storage = provider
                .open(&file_name)
                .map_err(|e| StoreError::io(format!("open {file_name}"), e))?;
            let index = IndexFile::open(storage, order, Arc::clone(&registry), options.limits)
                .map_err(|e| StoreError::io(format!("open {file_name}"), e))?;
            indexes.push(Arc::new(index));
        }
        let indexes: [Arc<IndexFile>; 6] = indexes
            .try_into()
            .map_err(|_| StoreError::Fatal("wrong number of index files".to_string()))?;

        info!(name = %name, wrong_file_version, "opened statement store");
        Ok(Self {
            shared: Arc::new(StoreShared {
                state: Mutex::new(StoreState {
                    metaroot,
                    lock: Some(lock),
                    wrong_file_version,
                    current: None,
                    dirty: true,
                    committed: None,
                    recording: None,
                    prepared: false,
                    phase_index: 0,
                    phase_number: 0,
                }),
                registry,
                indexes,
                provider,
                name,
            }),
        })
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.shared.state.lock().map_err(|_| StoreError::poisoned())
    }

    /// True if the current phase holds no statements.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.nr_triples()? == 0)
    }

    /// Number of statements in the current phase.
    pub fn nr_triples(&self) -> Result<u64, StoreError> {
        let state = self.state()?;
        Ok(current(&state)?.roots.count())
    }

    /// Number of the last prepared phase.
    pub fn phase_number(&self) -> Result<u32, StoreError> {
        let state = self.state()?;
        current(&state)?;
        Ok(state.phase_number)
    }

    /// Add a statement. Adding a statement already present does nothing.
    pub fn add_triple(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<(), StoreError> {
        let quad = Quad::new(subject, predicate, object, graph);
        let mut state = self.state()?;
        current(&state)?;
        if !quad.is_storable() {
            return Err(StoreError::Validation(format!(
                "Attempt to add a triple with node number out of range: {quad}"
            )));
        }

        let phase = self.writable_phase(&mut state)?;
        let mut roots = phase.roots;
        let mut inserted = 0;
        for index in &self.shared.indexes {
            let root = roots.get(index.order());
            let updated = index
                .insert(root, &quad)
                .map_err(|e| StoreError::io(format!("insert {quad} into {}", index.order()), e))?;
            if let Some(updated) = updated {
                roots.set(index.order(), updated);
                inserted += 1;
            }
        }
        self.apply(&mut state, phase.generation, roots, inserted, "insert", &quad)
    }

    /// Remove every statement matching the pattern; [`NONE`] matches any value.
    pub fn remove_triples(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<(), StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let mut state = self.state()?;
        let phase = current(&state)?;
        if pattern.to_array().iter().any(|node| *node < NONE) {
            return Err(StoreError::Validation(format!(
                "Attempt to remove a triple with node number out of range: {pattern}"
            )));
        }

        if pattern.is_fully_bound() {
            return self.remove_one(&mut state, &pattern);
        }

        // The matches are collected first: removal rewrites the trees a scan
        // would be walking.
        let matches = {
            let token = self.acquire(phase.generation)?;
            let (order, bound) = select_order(&pattern);
            let mut tuples = scan(&self.shared, token, order, &pattern, bound);
            let mut matches = Vec::new();
            while tuples.next()? {
                if let Some(quad) = tuples.current_quad() {
                    matches.push(quad);
                }
            }
            tuples.close();
            matches
        };
        debug!(pattern = %pattern, matches = matches.len(), "removing matching statements");

        for quad in &matches {
            self.remove_one(&mut state, quad)?;
        }
        Ok(())
    }

    fn remove_one(&self, state: &mut StoreState, quad: &Quad) -> Result<(), StoreError> {
        let phase = self.writable_phase(state)?;
        let mut roots = phase.roots;
        let mut removed = 0;
        for index in &self.shared.indexes {
            let root = roots.get(index.order());
            let updated = index
                .remove(root, quad)
                .map_err(|e| StoreError::io(format!("remove {quad} from {}", index.order()), e))?;
            if let Some(updated) = updated {
                roots.set(index.order(), updated);
                removed += 1;
            }
        }
        self.apply(state, phase.generation, roots, removed, "remove", quad)
    }

    /// Publish the roots produced by a mutation of all six indexes.
    fn apply(
        &self,
        state: &mut StoreState,
        generation: Generation,
        roots: PhaseRoots,
        changed: usize,
        operation: &str,
        quad: &Quad,
    ) -> Result<(), StoreError> {
        match changed {
            0 => Ok(()),
            n if n == self.shared.indexes.len() => {
                state.current = Some(CurrentPhase { generation, roots });
                self.shared.registry.update(generation, roots);
                Ok(())
            }
            n => {
                error!(
                    operation,
                    quad = %quad,
                    changed = n,
                    "indexes disagree on statement"
                );
                Err(StoreError::Fatal(format!(
                    "{operation} of {quad} changed {n} of {} indexes",
                    self.shared.indexes.len()
                )))
            }
        }
    }

    /// The phase to mutate, cloning the current one if a reader holds it.
    fn writable_phase(&self, state: &mut StoreState) -> Result<CurrentPhase, StoreError> {
        let phase = current(state)?;
        if !state.dirty && self.shared.registry.is_in_use(phase.generation) {
            debug!(generation = phase.generation, "current phase in use, copying on write");
            return self.install_current(state, phase.roots);
        }
        Ok(phase)
    }

    /// Make a new current phase with `roots`.
    fn install_current(
        &self,
        state: &mut StoreState,
        roots: PhaseRoots,
    ) -> Result<CurrentPhase, StoreError> {
        let generation = self.shared.registry.create_current(roots);
        for index in &self.shared.indexes {
            index
                .begin_phase()
                .map_err(|e| StoreError::io(format!("begin phase in {}", index.order()), e))?;
        }
        let phase = CurrentPhase { generation, roots };
        state.current = Some(phase);
        state.dirty = true;
        Ok(phase)
    }

    fn acquire(&self, generation: Generation) -> Result<PhaseToken, StoreError> {
        self.shared
            .registry
            .acquire(generation)
            .ok_or_else(|| StoreError::Fatal(format!("current phase {generation} missing from registry")))
    }

    /// A reader token on the current phase.
    fn read_token(&self, state: &mut StoreState) -> Result<PhaseToken, StoreError> {
        let phase = current(state)?;
        state.dirty = false;
        self.acquire(phase.generation)
    }

    /// Statements matching the pattern, leading with the bound columns.
    ///
    /// Node ids below [`NONE`] match nothing. A fully bound pattern gives a
    /// cursor with no columns and zero or one rows.
    pub fn find_tuples(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<StoreTuples, StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let token = self.read_token(&mut *self.state()?)?;
        let (order, bound) = select_order(&pattern);
        Ok(scan(&self.shared, token, order, &pattern, bound))
    }

    /// Like [`Self::find_tuples`], but the exposed columns follow the
    /// ordering that puts the bound columns, then the rest of `mask`, first.
    pub fn find_tuples_with_mask(
        &self,
        mask: Mask,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<StoreTuples, StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let (order, bound) = select_order_with_mask(mask, &pattern)?;
        let token = self.read_token(&mut *self.state()?)?;
        Ok(scan(&self.shared, token, order, &pattern, bound))
    }

    /// Every statement, in the ordering suited to later binding the flagged
    /// columns.
    pub fn find_tuples_for_bound(
        &self,
        subject_bound: bool,
        predicate_bound: bool,
        object_bound: bool,
        graph_bound: bool,
    ) -> Result<StoreTuples, StoreError> {
        let mask = mask_of([subject_bound, predicate_bound, object_bound, graph_bound]);
        let token = self.read_token(&mut *self.state()?)?;
        Ok(scan(&self.shared, token, IndexOrder::for_mask(mask), &Quad::default(), 0))
    }

    /// True if any statement matches the pattern.
    pub fn exists_triples(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<bool, StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let state = self.state()?;
        let phase = current(&state)?;
        exists_in(&self.shared, &phase.roots, &pattern)
    }

    /// A view of the last committed phase.
    pub fn new_read_only(&self) -> Result<ReadOnlyStatementStore, StoreError> {
        let token = self
            .state()?
            .committed
            .clone()
            .ok_or_else(|| {
                StoreError::State("Cannot create read only view of uninitialized store".to_string())
            })?;
        Ok(ReadOnlyStatementStore::new(Arc::clone(&self.shared), token))
    }

    /// Start over with an empty store whose phase number is `phase_number`.
    pub fn clear(&self, phase_number: u32) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.current.is_some() {
            return Err(StoreError::State("Store already has a current phase".to_string()));
        }

        state
            .metaroot
            .initialize()
            .map_err(|e| StoreError::io("initialize metaroot", e))?;
        self.shared.registry.reset();
        for index in &self.shared.indexes {
            index
                .clear()
                .map_err(|e| StoreError::io(format!("clear {}", index.order()), e))?;
        }

        state.committed = Some(self.shared.registry.acquire_snapshot(PhaseRoots::default()));
        state.recording = None;
        state.prepared = false;
        state.phase_number = phase_number;
        state.phase_index = 1;
        state.wrong_file_version = false;
        self.install_current(&mut state, PhaseRoots::default())?;

        info!(name = %self.shared.name, phase_number, "cleared statement store");
        Ok(())
    }

    /// [`Self::clear`] from phase 0, unless the store is already initialized.
    pub fn clear_default(&self) -> Result<(), StoreError> {
        if self.state()?.current.is_some() {
            return Ok(());
        }
        self.clear(0)
    }

    /// Phase numbers of the valid metaroot slots, highest first.
    ///
    /// Empty if the store already has a current phase.
    pub fn recover(&self) -> Result<Vec<u32>, StoreError> {
        let mut state = self.state()?;
        if state.current.is_some() {
            return Ok(Vec::new());
        }
        if state.wrong_file_version {
            return Err(StoreError::State("Wrong metaroot file version".to_string()));
        }

        let status = state
            .metaroot
            .status()
            .map_err(|e| StoreError::io("read metaroot", e))?;
        if status == MetarootStatus::Uninitialized {
            state
                .metaroot
                .initialize()
                .map_err(|e| StoreError::io("initialize metaroot", e))?;
        }

        let mut phases = Vec::with_capacity(SLOT_COUNT);
        for slot in 0..SLOT_COUNT {
            let contents = state
                .metaroot
                .read_slot(slot)
                .map_err(|e| StoreError::io(format!("read metaroot slot {slot}"), e))?;
            if contents.valid {
                phases.push(contents.phase_number);
            }
        }
        phases.sort_unstable_by(|a, b| b.cmp(a));
        debug!(?phases, "recovered phases");
        Ok(phases)
    }

    /// Adopt the on-disk phase `phase_number` as the committed phase and
    /// continue from a copy of it.
    pub fn select_phase(&self, phase_number: u32) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if state.current.is_some() {
            return Err(StoreError::State(
                "select_phase() called on initialized store".to_string(),
            ));
        }
        if state.wrong_file_version {
            return Err(StoreError::State("Wrong metaroot file version".to_string()));
        }

        let mut selected = None;
        for slot in 0..SLOT_COUNT {
            let contents = state
                .metaroot
                .read_slot(slot)
                .map_err(|e| StoreError::io(format!("read metaroot slot {slot}"), e))?;
            if contents.valid && contents.phase_number == phase_number {
                selected = Some((slot, contents));
                break;
            }
        }
        let Some((slot, contents)) = selected else {
            return Err(StoreError::State(format!("Invalid phase number: {phase_number}")));
        };

        self.shared.registry.reset();
        state.committed = Some(self.shared.registry.acquire_snapshot(contents.roots));
        state.recording = None;
        state.prepared = false;
        state.phase_index = slot;
        state.phase_number = phase_number;
        self.install_current(&mut state, contents.roots)?;
        for index in &self.shared.indexes {
            index
                .adopt()
                .map_err(|e| StoreError::io(format!("adopt phase in {}", index.order()), e))?;
        }

        // The next prepare writes the other slot.
        state
            .metaroot
            .set_valid(1 - slot, false)
            .and_then(|()| state.metaroot.force())
            .map_err(|e| StoreError::io("invalidate metaroot slot", e))?;

        info!(name = %self.shared.name, phase_number, slot, "selected phase");
        Ok(())
    }

    /// Write the current phase to the free metaroot slot.
    ///
    /// New writes go to a fresh phase so the recorded one stays fixed.
    pub fn prepare(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let phase = current(&state)?;
        if state.prepared {
            return Err(StoreError::State("prepare() called twice".to_string()));
        }

        let recording = self.acquire(phase.generation)?;
        self.install_current(&mut state, phase.roots)?;

        match self.record_phase(&mut state, recording.roots()) {
            Ok((phase_index, phase_number)) => {
                state.phase_index = phase_index;
                state.phase_number = phase_number;
                state.prepared = true;
                state.recording = Some(recording);
                info!(
                    name = %self.shared.name,
                    phase_number,
                    statements = recording_count(&state),
                    "prepared phase"
                );
                Ok(())
            }
            Err(e) => {
                error!(name = %self.shared.name, error = %e, "prepare failed");
                Err(e)
            }
        }
    }

    /// Force the indexes, then write and validate the free slot.
    fn record_phase(
        &self,
        state: &mut StoreState,
        roots: &PhaseRoots,
    ) -> Result<(usize, u32), StoreError> {
        for index in &self.shared.indexes {
            index
                .force()
                .map_err(|e| StoreError::io(format!("force {}", index.order()), e))?;
        }

        let phase_index = 1 - state.phase_index;
        let phase_number = state.phase_number + 1;
        let slot = MetarootSlot {
            valid: false,
            phase_number,
            roots: *roots,
        };
        debug!(phase_number, slot = phase_index, "writing metaroot");
        state
            .metaroot
            .write_slot(phase_index, &slot)
            .and_then(|()| state.metaroot.force())
            .and_then(|()| state.metaroot.set_valid(phase_index, true))
            .and_then(|()| state.metaroot.force())
            .map_err(|e| StoreError::io(format!("write metaroot for phase {phase_number}"), e))?;
        Ok((phase_index, phase_number))
    }

    /// Make the prepared phase the committed one.
    ///
    /// A failure here closes the store and is reported as fatal.
    pub fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        if !state.prepared {
            return Err(StoreError::State(
                "commit() called without previous prepare()".to_string(),
            ));
        }

        let previous = 1 - state.phase_index;
        let result = state
            .metaroot
            .set_valid(previous, false)
            .and_then(|()| state.metaroot.force());
        state.prepared = false;

        match result {
            Ok(()) => {
                state.committed = state.recording.take();
                info!(name = %self.shared.name, phase_number = state.phase_number, "committed phase");
                Ok(())
            }
            Err(e) => {
                state.recording = None;
                error!(name = %self.shared.name, error = %e, "commit failed, closing store");
                if let Err(close_error) = self.close_locked(&mut state) {
                    error!(error = %close_error, "forced close failed");
                }
                Err(StoreError::Fatal(format!("I/O error while performing commit: {e}")))
            }
        }
    }

    /// Abandon the current phase, and the prepared one if any, returning to
    /// the last committed phase.
    pub fn rollback(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        current(&state)?;

        let mut result = Ok(());
        if state.prepared {
            state.phase_index = 1 - state.phase_index;
            state.phase_number -= 1;
            state.recording = None;
            state.prepared = false;

            let abandoned = 1 - state.phase_index;
            result = state
                .metaroot
                .set_valid(abandoned, false)
                .and_then(|()| state.metaroot.force())
                .map_err(|e| StoreError::io("invalidate metaroot during rollback", e));
        }

        let committed = state
            .committed
            .as_ref()
            .map(|token| *token.roots())
            .ok_or_else(|| StoreError::State("no committed phase to roll back to".to_string()))?;
        self.install_current(&mut state, committed)?;
        info!(name = %self.shared.name, phase_number = state.phase_number, "rolled back");
        result
    }

    /// Release every phase. The files stay open.
    pub fn unmap(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        Self::unmap_locked(&self.shared, &mut state);
        Ok(())
    }

    fn unmap_locked(shared: &StoreShared, state: &mut StoreState) {
        if state.prepared {
            warn!(name = %shared.name, "unmapping with a prepared phase; it is not committed");
        }
        state.recording = None;
        state.prepared = false;
        state.current = None;
        shared.registry.retire_current();
        state.committed = None;
    }

    /// Release every phase, flush the files and drop the lock.
    pub fn close(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        self.close_locked(&mut state)
    }

    fn close_locked(&self, state: &mut StoreState) -> Result<(), StoreError> {
        Self::unmap_locked(&self.shared, state);

        let mut saved = Ok(());
        for index in &self.shared.indexes {
            if let Err(e) = index.force() {
                saved = Err(StoreError::io(format!("close {}", index.order()), e));
            }
        }
        if let Err(e) = state.metaroot.force() {
            saved = Err(StoreError::io("close metaroot", e));
        }
        state.lock = None;
        info!(name = %self.shared.name, "closed statement store");
        saved
    }

    /// Close the store and remove all of its files.
    pub fn delete(&self) -> Result<(), StoreError> {
        let closed = self.close();

        let name = &self.shared.name;
        let mut files = vec![format!("{name}.g")];
        files.extend(IndexOrder::ALL.iter().map(|order| index_file_name(name, *order)));
        let mut result = closed;
        for file_name in files {
            if let Err(e) = self.shared.provider.remove(&file_name) {
                result = Err(StoreError::io(format!("remove {file_name}"), e));
            }
        }
        result
    }

    /// Walk every index, checking that all six hold the recorded number of
    /// statements. Returns that number.
    pub fn check_integrity(&self) -> Result<u64, StoreError> {
        let state = self.state()?;
        let phase = current(&state)?;
        let expected = phase.roots.count();

        for index in &self.shared.indexes {
            let root = phase.roots.get(index.order());
            let counted = index
                .recount(root)
                .map_err(|e| StoreError::io(format!("walk {}", index.order()), e))?;
            if counted != root.count || counted != expected {
                error!(
                    index = %index.order(),
                    counted,
                    recorded = root.count,
                    expected,
                    "index count mismatch"
                );
                return Err(StoreError::Fatal(format!(
                    "{} holds {counted} statements, expected {expected}",
                    index.order()
                )));
            }
        }
        Ok(expected)
    }
}

impl fmt::Display for StatementStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = match self.state() {
            Ok(mut state) => match state.current {
                Some(_) => self.read_token(&mut state).ok(),
                None => None,
            },
            Err(_) => None,
        };
        let Some(token) = snapshot else {
            return write!(f, "Uninitialized store.");
        };

        let roots = *token.roots();
        for index in &self.shared.indexes {
            let count = roots.get(index.order()).count;
            writeln!(f, "{}: {count} statements", index.order())?;
        }
        if roots.count() <= DISPLAY_LIMIT {
            let mut tuples = scan(&self.shared, token, IndexOrder::Spog, &Quad::default(), 0);
            while let Ok(true) = tuples.next() {
                if let Some(quad) = tuples.current_quad() {
                    writeln!(f, "  {quad}")?;
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for StatementStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementStore")
            .field("name", &self.shared.name)
            .field("registry", &self.shared.registry)
            .finish_non_exhaustive()
    }
}

/// Name of the index file for `order` in the store `name`.
#[must_use]
pub fn index_file_name(name: &str, order: IndexOrder) -> String {
    format!("{name}.g_{}", order.file_suffix())
}

fn current(state: &StoreState) -> Result<CurrentPhase, StoreError> {
    state.current.ok_or_else(|| {
        StoreError::State(
            "No current phase. Store has not been initialized or has been closed.".to_string(),
        )
    })
}

fn recording_count(state: &StoreState) -> u64 {
    state
        .recording
        .as_ref()
        .map_or(0, |token| token.roots().count())
}

/// The ordering for a pattern and the number of its bound columns.
pub(crate) fn select_order(pattern: &Quad) -> (IndexOrder, usize) {
    let mask = mask_for(pattern);
    (IndexOrder::for_mask(mask), mask.count_ones() as usize)
}

/// The ordering that leads with the bound columns of `pattern`, then the
/// rest of `mask`.
pub(crate) fn select_order_with_mask(
    mask: Mask,
    pattern: &Quad,
) -> Result<(IndexOrder, usize), StoreError> {
    let bound = mask_for(pattern);
    if bound & !mask != 0 {
        return Err(StoreError::Validation(format!(
            "Bad explicit index selection: mask {mask:#06b} excludes bound columns of {pattern}"
        )));
    }
    IndexOrder::for_explicit_mask(mask, bound)
        .map(|order| (order, bound.count_ones() as usize))
        .ok_or_else(|| {
            StoreError::Validation(format!(
                "Bad explicit index selection: no ordering for mask {mask:#06b} with {pattern}"
            ))
        })
}

/// A scan of `order` in the phase held by `token`, bound to the first
/// `bound` columns of `pattern`.
pub(crate) fn scan(
    shared: &StoreShared,
    token: PhaseToken,
    order: IndexOrder,
    pattern: &Quad,
    bound: usize,
) -> StoreTuples {
    let index = Arc::clone(&shared.indexes[order.position()]);
    let fixed = order.to_key(pattern)[..bound].to_vec();
    if pattern.to_array().iter().any(|node| *node < NONE) {
        StoreTuples::empty(index, token, fixed)
    } else {
        StoreTuples::new(index, token, fixed)
    }
}

/// Existence test by a single seek.
pub(crate) fn exists_in(
    shared: &StoreShared,
    roots: &PhaseRoots,
    pattern: &Quad,
) -> Result<bool, StoreError> {
    if pattern.to_array().iter().any(|node| *node < NONE) {
        return Ok(false);
    }
    let (order, bound) = select_order(pattern);
    let root = roots.get(order);
    if bound == 0 {
        return Ok(root.count > 0);
    }
    let fixed = &order.to_key(pattern)[..bound];
    let cursor = shared.indexes[order.position()]
        .seek(root, &lower_bound(fixed))
        .map_err(|e| StoreError::io(format!("exists {pattern} in {order}"), e))?;
    Ok(cursor.current().is_some_and(|key| key.starts_with(fixed)))
}

impl StoreShared {
    pub(crate) fn committed_token(&self) -> Result<Option<PhaseToken>, StoreError> {
        let state = self.state.lock().map_err(|_| StoreError::poisoned())?;
        Ok(state.committed.clone())
    }
}
