//! End-to-end scenarios over a whole store.
//!
//! Each test file covers a specific property, using fixed fixtures or a
//! seeded RNG so every run sees the same data.

#![cfg(test)]

mod helpers;

mod test_crash_recovery;
mod test_duplicate_resolution;
mod test_index_agreement;
mod test_inverse_resolution;
mod test_ordering_restart;
mod test_phase_isolation;
mod test_set_semantics;
mod test_xa_resource;
