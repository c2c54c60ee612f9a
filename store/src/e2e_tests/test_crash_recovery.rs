//! Test recovery after a crash at each step of the commit protocol.

use std::collections::{BTreeMap, BTreeSet};

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::e2e_tests::helpers::*;
use crate::simulation::{FaultConfig, SimulatedDisk};
use crate::statement::{ErrorCategory, StatementStore};
use crate::testing::{SIMULATED_NAME, open_simulated_store};
use crate::types::Quad;

const METAROOT: &str = "xa.g";

/// A store on `disk` with phase 1 committed, holding two statements, and
/// one more statement written but not prepared.
fn committed_store(disk: &SimulatedDisk) -> StatementStore {
    let store = open_simulated_store(disk, 4);
    store.clear_default().expect("clear");
    store.add_triple(1, 2, 3, 4).expect("add");
    store.add_triple(2, 3, 4, 5).expect("add");
    commit(&store);
    store.add_triple(7, 7, 7, 7).expect("add in flight");
    store
}

fn reopen(disk: &SimulatedDisk) -> (StatementStore, Vec<u32>) {
    let store = open_simulated_store(disk, 4);
    let phases = store.recover().expect("recover");
    (store, phases)
}

#[test]
fn test_failed_validation_write_recovers_previous_phase() {
    let disk = SimulatedDisk::new(31);
    let store = committed_store(&disk);

    // The first metaroot write of prepare stores the slot, the second
    // flips its valid flag.
    disk.fail_nth_write(METAROOT, 2).expect("arm fault");
    let error = store.prepare().expect_err("prepare must fail");
    assert_eq!(error.category(), ErrorCategory::Io);
    drop(store);
    disk.crash().expect("crash");

    let (store, phases) = reopen(&disk);
    assert_eq!(phases, vec![1]);
    store.select_phase(1).expect("select");
    assert_eq!(
        all_quads(&store),
        vec![Quad::new(1, 2, 3, 4), Quad::new(2, 3, 4, 5)]
    );
    assert_eq!(store.check_integrity().expect("integrity"), 2);
}

#[test]
fn test_failed_final_force_recovers_previous_phase() {
    let disk = SimulatedDisk::new(32);
    let store = committed_store(&disk);

    // Syncs in prepare: after the slot write, then after the valid flag.
    disk.fail_nth_sync(METAROOT, 2).expect("arm fault");
    assert!(store.prepare().is_err());
    drop(store);
    disk.crash().expect("crash");

    let (store, phases) = reopen(&disk);
    assert_eq!(phases, vec![1]);
    store.select_phase(1).expect("select");
    assert!(!store.exists_triples(7, 7, 7, 7).expect("exists"));
    assert_eq!(store.nr_triples().expect("count"), 2);
}

#[test]
fn test_failed_commit_is_fatal_and_both_phases_survive() {
    let disk = SimulatedDisk::new(33);
    let store = committed_store(&disk);
    store.prepare().expect("prepare");

    disk.fail_nth_write(METAROOT, 1).expect("arm fault");
    let error = store.commit().expect_err("commit must fail");
    assert_eq!(error.category(), ErrorCategory::Fatal);
    assert!(store.nr_triples().is_err());
    drop(store);
    disk.crash().expect("crash");

    let (store, phases) = reopen(&disk);
    assert_eq!(phases, vec![2, 1]);
    store.select_phase(2).expect("select");
    assert!(store.exists_triples(7, 7, 7, 7).expect("exists"));
    assert_eq!(store.check_integrity().expect("integrity"), 3);
}

#[test]
fn test_crash_after_commit_keeps_committed_phase() {
    let disk = SimulatedDisk::new(34);
    let store = committed_store(&disk);
    commit(&store);
    store.add_triple(8, 8, 8, 8).expect("add after commit");
    disk.crash().expect("crash");
    drop(store);

    let (store, phases) = reopen(&disk);
    assert_eq!(phases, vec![2]);
    store.select_phase(2).expect("select");
    assert_eq!(store.nr_triples().expect("count"), 3);
    assert!(!store.exists_triples(8, 8, 8, 8).expect("exists"));

    // The recovered store keeps working.
    store.add_triple(9, 9, 9, 9).expect("add");
    commit(&store);
    assert_eq!(store.phase_number().expect("phase"), 3);
    assert_eq!(store.check_integrity().expect("integrity"), 4);
}

#[test]
fn test_simulated_store_files() {
    let disk = SimulatedDisk::new(35);
    let store = committed_store(&disk);
    let names = disk.file_names().expect("names");
    assert!(names.contains(&format!("{SIMULATED_NAME}.g")));
    assert_eq!(names.len(), 7);

    store.delete().expect("delete");
    assert!(disk.file_names().expect("names").is_empty());
}

#[test]
fn test_random_faults_never_corrupt_the_recovered_phase() {
    for seed in [51, 52, 53, 54] {
        let disk = SimulatedDisk::new(seed);
        let store = open_simulated_store(&disk, 4);
        store.clear_default().expect("clear");
        disk.set_fault_config(FaultConfig::low_faults())
            .expect("enable faults");

        let mut rng = StdRng::seed_from_u64(seed);
        let mut model = BTreeSet::new();
        let mut recorded: BTreeMap<u32, Vec<Quad>> = BTreeMap::new();
        'rounds: for _ in 0..40 {
            for _ in 0..10 {
                let quad = random_quad(&mut rng, 6);
                if store.add_triple(quad.subject, quad.predicate, quad.object, quad.graph).is_err() {
                    break 'rounds;
                }
                model.insert(quad);
            }
            if store.prepare().is_err() {
                break;
            }
            let phase_number = store.phase_number().expect("phase");
            recorded.insert(phase_number, model.iter().copied().collect());
            if store.commit().is_err() {
                break;
            }
        }
        drop(store);
        disk.crash().expect("crash");
        disk.set_fault_config(FaultConfig::no_faults())
            .expect("disable faults");

        let (store, phases) = reopen(&disk);
        let Some(&newest) = phases.first() else {
            assert!(recorded.is_empty(), "seed {seed}: a recorded phase was lost");
            continue;
        };
        store.select_phase(newest).expect("select");
        assert_eq!(
            Some(&all_quads(&store)),
            recorded.get(&newest),
            "seed {seed}: phase {newest}"
        );
        let count = store.check_integrity().expect("integrity");
        assert_eq!(count, recorded[&newest].len() as u64);
    }
}
