#![cfg_attr(test, allow(clippy::disallowed_methods))]

// Layers, bottom up:
// 1. storage: page files, copy-on-write B-trees, the metaroot
// 2. statement: six index orderings in lock-step, phases, commit protocol
// 3. resolution: constraints answered as cursors over the indexes
// 4. xa: the store as a two-phase-commit resource
//
// Writes go to the current phase. Readers pin a phase with a token; the
// next write clones the phase so pinned readers keep their snapshot.
// Prepare records the phase in the metaroot, commit makes it the one a
// restart recovers.

pub mod config;
pub mod resolution;
pub mod simulation;
pub mod statement;
pub mod storage;
pub mod types;
pub mod xa;

#[cfg(test)]
mod e2e_tests;
#[cfg(test)]
mod testing;

pub use config::{ConfigError, StoreConfig};
pub use resolution::{Resolution, resolve};
pub use statement::{StatementSource, StatementStore, StoreError, Tuples};
