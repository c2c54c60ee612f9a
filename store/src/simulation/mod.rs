//! Deterministic simulation of the disk under a store.
//!
//! Every file of a store is reached through a
//! [`StorageProvider`](crate::storage::StorageProvider). The simulated
//! provider keeps files in memory, so tests can:
//! 1. Lose every unsynced write with a crash
//! 2. Fail an exact write or sync of a named file
//! 3. Inject random faults from a seeded RNG
//!
//! # Usage
//!
//! ```ignore
//! use quadstore::simulation::SimulatedDisk;
//!
//! let disk = SimulatedDisk::new(12345);
//! let store = StatementStore::open_with(Arc::new(disk.clone()), StoreOptions::new("xa"))?;
//! disk.fail_nth_write("xa.g", 2)?;
//! assert!(store.prepare().is_err());
//! disk.crash()?;
//! ```

mod storage;

pub use storage::{FaultConfig, SimulatedDisk, SimulatedDiskStats, SimulatedStorage};
