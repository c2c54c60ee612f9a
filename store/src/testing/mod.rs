//! Shared fixtures for unit and end-to-end tests.

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::StoreConfig;
use crate::simulation::SimulatedDisk;
use crate::statement::{StatementStore, StoreOptions};
use crate::storage::btree::NodeLimits;

/// Name given to stores on a simulated disk.
pub const SIMULATED_NAME: &str = "xa";

/// Open an uninitialized store in a fresh temporary directory.
///
/// The directory is removed when the returned [`TempDir`] is dropped, so
/// keep it alive for as long as the store is used.
///
/// # Panics
///
/// Panics if the directory or the store cannot be created.
#[must_use]
#[allow(clippy::expect_used)]
pub fn open_temp_store() -> (TempDir, StatementStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = StatementStore::open(&StoreConfig::new(dir.path())).expect("open store");
    (dir, store)
}

/// Open the store on `disk`, with nodes capped at `max_entries` entries so
/// small data sets still build multi-level trees.
///
/// # Panics
///
/// Panics if the store cannot be opened.
#[must_use]
#[allow(clippy::expect_used)]
pub fn open_simulated_store(disk: &SimulatedDisk, max_entries: usize) -> StatementStore {
    let options =
        StoreOptions::new(SIMULATED_NAME).with_limits(NodeLimits::with_max_entries(max_entries));
    StatementStore::open_with(Arc::new(disk.clone()), options).expect("open simulated store")
}
