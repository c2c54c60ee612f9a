//! Test that statements form a set: duplicates and missing removals are no-ops.

use crate::testing::open_temp_store;

#[test]
fn test_duplicate_insert_and_missing_remove() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");

    store.add_triple(1, 2, 3, 4).expect("add");
    store.add_triple(1, 2, 3, 4).expect("add again");
    assert_eq!(store.nr_triples().expect("count"), 1);

    store.remove_triples(4, 3, 2, 1).expect("remove missing");
    store.remove_triples(9, 0, 0, 0).expect("remove missing pattern");
    assert_eq!(store.nr_triples().expect("count"), 1);
    assert_eq!(store.check_integrity().expect("integrity"), 1);

    store.remove_triples(1, 2, 3, 4).expect("remove");
    store.remove_triples(1, 2, 3, 4).expect("remove again");
    assert!(store.is_empty().expect("empty"));
}

#[test]
fn test_duplicate_insert_after_commit_keeps_phase_unchanged() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    store.add_triple(1, 1, 1, 1).expect("add");
    store.prepare().expect("prepare");
    store.commit().expect("commit");

    let view = store.new_read_only().expect("view");
    store.add_triple(1, 1, 1, 1).expect("add existing");
    assert_eq!(store.nr_triples().expect("count"), 1);
    assert_eq!(view.nr_triples().expect("view count"), 1);
}
