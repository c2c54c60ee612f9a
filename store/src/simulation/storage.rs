//! Simulated in-memory disk for deterministic testing.
//!
//! A [`SimulatedDisk`] holds every file of a store in memory. Writes stay
//! pending until the file is synced; [`SimulatedDisk::crash`] throws the
//! pending writes away, which is what a power loss does to an unsynced
//! file. Faults can be injected at random, from a seeded RNG, or at an
//! exact write or sync of a named file.

// Pages are cloned between the pending and durable images
#![allow(clippy::disallowed_methods)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::storage::{Page, PageId, Storage, StorageError, StorageProvider, StoreLock};

/// Configuration for random fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a sync error (0.0 - 1.0).
    pub sync_error_rate: f64,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config with low fault rates (for stress testing).
    #[must_use]
    pub const fn low_faults() -> Self {
        Self {
            read_error_rate: 0.001,
            write_error_rate: 0.001,
            sync_error_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Write,
    Sync,
}

/// Fail the `remaining`-th matching operation on `file`.
#[derive(Debug)]
struct Trigger {
    file: String,
    operation: Operation,
    remaining: u64,
}

/// Statistics about simulated disk operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedDiskStats {
    pub reads: u64,
    pub writes: u64,
    pub syncs: u64,
    pub injected_faults: u64,
    pub crashes: u64,
}

#[derive(Debug, Default)]
struct SimulatedFile {
    durable: HashMap<PageId, Page>,
    durable_pages: u64,
    pending: HashMap<PageId, Page>,
    total_pages: u64,
}

impl SimulatedFile {
    fn page(&self, page_id: PageId) -> Page {
        self.pending
            .get(&page_id)
            .or_else(|| self.durable.get(&page_id))
            .cloned()
            .unwrap_or_default()
    }

    fn sync(&mut self) {
        self.durable.extend(self.pending.drain());
        let total = self.total_pages;
        self.durable.retain(|page_id, _| *page_id < total);
        self.durable_pages = total;
    }

    fn crash(&mut self) {
        self.pending.clear();
        self.total_pages = self.durable_pages;
    }
}

#[derive(Debug)]
struct DiskState {
    files: HashMap<String, SimulatedFile>,
    /// Lock name to the id of the claim holding it.
    locks: HashMap<String, u64>,
    next_claim: u64,
    faults: FaultConfig,
    triggers: Vec<Trigger>,
    rng: StdRng,
    stats: SimulatedDiskStats,
}

impl DiskState {
    fn file(&mut self, name: &str) -> &mut SimulatedFile {
        self.files.entry(name.to_string()).or_default()
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&mut self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        if rate >= 1.0 {
            return true;
        }
        self.rng.random::<f64>() < rate
    }

    fn fire_trigger(&mut self, file: &str, operation: Operation) -> bool {
        let mut fired = false;
        self.triggers.retain_mut(|trigger| {
            if trigger.file != file || trigger.operation != operation {
                return true;
            }
            trigger.remaining -= 1;
            if trigger.remaining == 0 {
                fired = true;
                return false;
            }
            true
        });
        fired
    }

    fn inject(&mut self, file: &str, operation: Operation, rate: f64) -> Result<(), StorageError> {
        if self.fire_trigger(file, operation) || self.should_inject_fault(rate) {
            self.stats.injected_faults += 1;
            debug!(file, ?operation, "injecting fault");
            return Err(StorageError::InjectedFault(format!(
                "{operation:?} of {file}"
            )));
        }
        Ok(())
    }
}

/// An in-memory disk shared by every file of the stores opened on it.
///
/// Clones share the same disk, so a test can keep one to crash it while a
/// store holds another.
#[derive(Debug, Clone)]
pub struct SimulatedDisk {
    state: Arc<Mutex<DiskState>>,
}

impl SimulatedDisk {
    /// Create a disk without random faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create a disk with custom fault configuration.
    ///
    /// The seed ensures deterministic behavior: the same seed produces the
    /// same sequence of faults.
    #[must_use]
    pub fn with_config(seed: u64, faults: FaultConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(DiskState {
                files: HashMap::new(),
                locks: HashMap::new(),
                next_claim: 0,
                faults,
                triggers: Vec::new(),
                rng: StdRng::seed_from_u64(seed),
                stats: SimulatedDiskStats::default(),
            })),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, DiskState>, StorageError> {
        lock_state(&self.state)
    }

    /// Update the random fault configuration.
    pub fn set_fault_config(&self, faults: FaultConfig) -> Result<(), StorageError> {
        self.state()?.faults = faults;
        Ok(())
    }

    /// Fail the `n`-th write to `file_name` from now on.
    pub fn fail_nth_write(&self, file_name: &str, n: u64) -> Result<(), StorageError> {
        self.add_trigger(file_name, Operation::Write, n)
    }

    /// Fail the `n`-th sync of `file_name` from now on.
    pub fn fail_nth_sync(&self, file_name: &str, n: u64) -> Result<(), StorageError> {
        self.add_trigger(file_name, Operation::Sync, n)
    }

    fn add_trigger(&self, file: &str, operation: Operation, n: u64) -> Result<(), StorageError> {
        self.state()?.triggers.push(Trigger {
            file: file.to_string(),
            operation,
            remaining: n.max(1),
        });
        Ok(())
    }

    /// Lose every unsynced write and release every lock.
    pub fn crash(&self) -> Result<(), StorageError> {
        let mut state = self.state()?;
        for file in state.files.values_mut() {
            file.crash();
        }
        state.locks.clear();
        state.triggers.clear();
        state.stats.crashes += 1;
        debug!(crashes = state.stats.crashes, "simulated crash");
        Ok(())
    }

    /// Names of the files on the disk, sorted.
    pub fn file_names(&self) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self.state()?.files.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn stats(&self) -> Result<SimulatedDiskStats, StorageError> {
        Ok(self.state()?.stats.clone())
    }
}

fn lock_state(state: &Mutex<DiskState>) -> Result<MutexGuard<'_, DiskState>, StorageError> {
    state
        .lock()
        .map_err(|_| StorageError::Io(std::io::Error::other("simulated disk poisoned")))
}

impl StorageProvider for SimulatedDisk {
    fn open(&self, file_name: &str) -> Result<Box<dyn Storage>, StorageError> {
        self.state()?.file(file_name);
        Ok(Box::new(SimulatedStorage {
            disk: Arc::clone(&self.state),
            name: file_name.to_string(),
        }))
    }

    fn remove(&self, file_name: &str) -> Result<(), StorageError> {
        self.state()?.files.remove(file_name);
        Ok(())
    }

    fn lock(&self, file_name: &str) -> Result<StoreLock, StorageError> {
        let mut state = self.state()?;
        if state.locks.contains_key(file_name) {
            return Err(StorageError::Locked(file_name.into()));
        }
        state.next_claim += 1;
        let claim = state.next_claim;
        state.locks.insert(file_name.to_string(), claim);

        let disk = Arc::clone(&self.state);
        let name = file_name.to_string();
        Ok(StoreLock::new(move || {
            // A crash may have handed the lock to a newer claim.
            if let Ok(mut state) = lock_state(&disk)
                && state.locks.get(&name) == Some(&claim)
            {
                state.locks.remove(&name);
            }
        }))
    }
}

/// One file on a [`SimulatedDisk`].
pub struct SimulatedStorage {
    disk: Arc<Mutex<DiskState>>,
    name: String,
}

impl SimulatedStorage {
    fn check_bounds(file: &SimulatedFile, page_id: PageId) -> Result<(), StorageError> {
        if page_id >= file.total_pages {
            return Err(StorageError::PageOutOfBounds {
                page_id,
                total_pages: file.total_pages,
            });
        }
        Ok(())
    }
}

impl Storage for SimulatedStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_page(&mut self, page_id: PageId) -> Result<Page, StorageError> {
        let mut state = lock_state(&self.disk)?;
        state.stats.reads += 1;
        let rate = state.faults.read_error_rate;
        if state.should_inject_fault(rate) {
            state.stats.injected_faults += 1;
            return Err(StorageError::InjectedFault(format!("read of {}", self.name)));
        }
        let file = state.file(&self.name);
        Self::check_bounds(file, page_id)?;
        Ok(file.page(page_id))
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<(), StorageError> {
        let mut state = lock_state(&self.disk)?;
        state.stats.writes += 1;
        let rate = state.faults.write_error_rate;
        state.inject(&self.name, Operation::Write, rate)?;
        let file = state.file(&self.name);
        Self::check_bounds(file, page_id)?;
        file.pending.insert(page_id, page.clone());
        Ok(())
    }

    fn sync(&mut self) -> Result<(), StorageError> {
        let mut state = lock_state(&self.disk)?;
        state.stats.syncs += 1;
        let rate = state.faults.sync_error_rate;
        state.inject(&self.name, Operation::Sync, rate)?;
        state.file(&self.name).sync();
        Ok(())
    }

    fn allocate_pages(&mut self, count: u64) -> Result<PageId, StorageError> {
        let mut state = lock_state(&self.disk)?;
        let file = state.file(&self.name);
        let first_new_page = file.total_pages;
        file.total_pages += count;
        Ok(first_new_page)
    }

    fn total_pages(&self) -> u64 {
        lock_state(&self.disk)
            .ok()
            .and_then(|state| state.files.get(&self.name).map(|file| file.total_pages))
            .unwrap_or(0)
    }

    fn truncate(&mut self, total_pages: u64) -> Result<(), StorageError> {
        let mut state = lock_state(&self.disk)?;
        let file = state.file(&self.name);
        file.total_pages = total_pages;
        file.pending.retain(|page_id, _| *page_id < total_pages);
        // Shrinking past synced pages leaves them to be dropped on sync.
        Ok(())
    }
}
