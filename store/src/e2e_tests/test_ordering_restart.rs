//! Test that every index scans in ascending order and restarts identically.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::e2e_tests::helpers::*;
use crate::simulation::SimulatedDisk;
use crate::statement::{IndexOrder, Tuples, collect_rows};
use crate::testing::open_simulated_store;

#[test]
fn test_each_ordering_scans_ascending_and_restarts() {
    let disk = SimulatedDisk::new(11);
    let store = open_simulated_store(&disk, 5);
    store.clear_default().expect("clear");
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..200 {
        let quad = random_quad(&mut rng, 10);
        store
            .add_triple(quad.subject, quad.predicate, quad.object, quad.graph)
            .expect("add");
    }
    let total = store.nr_triples().expect("count");

    for order in IndexOrder::ALL {
        // The first two columns of each ordering select it.
        let mask = order.leading_mask(2);
        let [s, p, o, g] = [0, 1, 2, 3].map(|column| mask & (1 << column) != 0);
        let mut tuples = store.find_tuples_for_bound(s, p, o, g).expect("scan");
        assert_eq!(tuples.order(), order);

        let first = collect_rows(&mut tuples).expect("first pass");
        assert_eq!(first.len() as u64, total, "{order}");
        assert!(first.windows(2).all(|pair| pair[0] < pair[1]), "{order} not ascending");

        let second = collect_rows(&mut tuples).expect("second pass");
        assert_eq!(first, second, "{order} restart differs");

        let explicit = store
            .find_tuples_with_mask(mask, 0, 0, 0, 0)
            .expect("scan with mask");
        assert_eq!(explicit.order(), order);
    }
}

#[test]
fn test_cloned_cursor_keeps_its_position() {
    let disk = SimulatedDisk::new(12);
    let store = open_simulated_store(&disk, 4);
    store.clear_default().expect("clear");
    for subject in 1..=20 {
        store.add_triple(subject, 1, 1, 1).expect("add");
    }

    let mut tuples = store.find_tuples(0, 1, 1, 1).expect("scan");
    tuples.before_first(&[], 0).expect("before first");
    for _ in 0..5 {
        assert!(tuples.next().expect("next"));
    }
    let mut clone = tuples.clone();
    assert_eq!(clone.column_value(0).expect("value"), 5);

    assert!(tuples.next().expect("next"));
    assert_eq!(tuples.column_value(0).expect("value"), 6);
    assert_eq!(clone.column_value(0).expect("value"), 5);

    tuples.close();
    assert!(clone.next().expect("clone next"));
    assert_eq!(clone.column_value(0).expect("value"), 6);
}
