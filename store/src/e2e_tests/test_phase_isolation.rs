//! Test that readers keep the phase they started on.

use crate::e2e_tests::helpers::*;
use crate::statement::{Tuples, collect_rows};
use crate::testing::open_temp_store;

#[test]
fn test_open_cursor_keeps_snapshot_across_commit() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    store.add_triple(1, 1, 1, 1).expect("add");
    store.add_triple(2, 2, 2, 1).expect("add");
    commit(&store);

    let mut before = store.find_tuples(0, 0, 0, 1).expect("scan before");
    store.add_triple(3, 3, 3, 1).expect("add");
    store.remove_triples(1, 1, 1, 1).expect("remove");
    commit(&store);

    let rows = collect_rows(&mut before).expect("rows before");
    assert_eq!(rows, vec![vec![1, 1, 1], vec![2, 2, 2]]);
    assert_eq!(before.row_count().expect("count before"), 2);

    let mut after = store.find_tuples(0, 0, 0, 1).expect("scan after");
    let rows = collect_rows(&mut after).expect("rows after");
    assert_eq!(rows, vec![vec![2, 2, 2], vec![3, 3, 3]]);
}

#[test]
fn test_uncommitted_writes_are_invisible_to_read_only_views() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    store.add_triple(1, 2, 3, 4).expect("add");
    commit(&store);

    let view = store.new_read_only().expect("view");
    store.add_triple(5, 6, 7, 8).expect("add uncommitted");
    assert!(store.exists_triples(5, 6, 7, 8).expect("store exists"));
    assert!(!view.exists_triples(5, 6, 7, 8).expect("view exists"));

    store.prepare().expect("prepare");
    assert!(!view.exists_triples(5, 6, 7, 8).expect("prepared not visible"));
    store.commit().expect("commit");
    assert!(!view.exists_triples(5, 6, 7, 8).expect("view keeps phase"));

    view.refresh().expect("refresh");
    assert!(view.exists_triples(5, 6, 7, 8).expect("refreshed view"));
    assert_eq!(view.nr_triples().expect("count"), 2);
}

#[test]
fn test_writes_after_a_read_do_not_disturb_the_open_cursor() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    for subject in 1..=10 {
        store.add_triple(subject, 1, 1, 1).expect("add");
    }

    let mut tuples = store.find_tuples(0, 1, 1, 1).expect("scan");
    tuples.before_first(&[], 0).expect("before first");
    assert!(tuples.next().expect("next"));

    // Not yet committed: the write clones the phase the cursor holds.
    store.remove_triples(0, 1, 1, 1).expect("remove all");
    assert!(store.is_empty().expect("empty"));

    let mut seen = vec![tuples.column_value(0).expect("value")];
    while tuples.next().expect("next") {
        seen.push(tuples.column_value(0).expect("value"));
    }
    assert_eq!(seen, (1..=10).collect::<Vec<_>>());
    assert_eq!(store.check_integrity().expect("integrity"), 0);
}
