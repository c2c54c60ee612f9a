//! Test that all six indexes agree after random inserts and removes.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::e2e_tests::helpers::*;
use crate::simulation::SimulatedDisk;
use crate::testing::open_simulated_store;
use crate::types::Quad;

fn run(seed: u64, operations: usize) {
    let disk = SimulatedDisk::new(seed);
    // Small nodes so a few hundred statements span several levels.
    let store = open_simulated_store(&disk, 4);
    store.clear_default().expect("clear");

    let mut rng = StdRng::seed_from_u64(seed);
    let mut model: BTreeSet<Quad> = BTreeSet::new();
    for step in 0..operations {
        let quad = random_quad(&mut rng, 8);
        if rng.random_bool(0.7) {
            store
                .add_triple(quad.subject, quad.predicate, quad.object, quad.graph)
                .expect("add");
            model.insert(quad);
        } else {
            store
                .remove_triples(quad.subject, quad.predicate, quad.object, quad.graph)
                .expect("remove");
            model.remove(&quad);
        }

        if step % 50 == 49 {
            commit(&store);
            assert_eq!(
                store.check_integrity().expect("integrity"),
                model.len() as u64,
                "seed {seed} step {step}"
            );
        }
    }

    assert_eq!(store.nr_triples().expect("count"), model.len() as u64);
    assert_eq!(store.check_integrity().expect("integrity"), model.len() as u64);
    assert_eq!(all_quads(&store), model.into_iter().collect::<Vec<_>>());
}

#[test]
fn test_random_operations_keep_indexes_in_agreement() {
    for seed in [1, 7, 42] {
        run(seed, 400);
    }
}

#[test]
fn test_wildcard_removal_keeps_indexes_in_agreement() {
    let disk = SimulatedDisk::new(3);
    let store = open_simulated_store(&disk, 4);
    store.clear_default().expect("clear");
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..300 {
        let quad = random_quad(&mut rng, 6);
        store
            .add_triple(quad.subject, quad.predicate, quad.object, quad.graph)
            .expect("add");
    }

    store.remove_triples(0, 2, 0, 0).expect("remove predicate 2");
    store.remove_triples(0, 0, 0, 5).expect("remove graph 5");

    let remaining = all_quads(&store);
    assert!(remaining.iter().all(|quad| quad.predicate != 2 && quad.graph != 5));
    assert_eq!(
        store.check_integrity().expect("integrity"),
        remaining.len() as u64
    );
    for pattern in [Quad::new(0, 2, 0, 0), Quad::new(0, 0, 0, 5)] {
        assert!(
            !store
                .exists_triples(pattern.subject, pattern.predicate, pattern.object, pattern.graph)
                .expect("exists")
        );
    }
}
