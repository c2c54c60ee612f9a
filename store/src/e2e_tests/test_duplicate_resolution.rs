//! Test constraints that force two or three positions to be equal.

use std::collections::BTreeSet;

use crate::e2e_tests::helpers::*;
use crate::resolution::{Resolution, resolve};
use crate::statement::{StatementStore, Tuples};
use crate::testing::open_temp_store;
use crate::types::ConstraintElement::{self, Node};
use crate::types::{Constraint, NodeId, Variable};

const SUBJECT_TRIPLES: [[NodeId; 3]; 23] = [
    [1, 1, 1],
    [1, 3, 1],
    [1, 3, 4],
    [1, 4, 1],
    [2, 1, 4],
    [2, 2, 2],
    [2, 2, 3],
    [2, 2, 4],
    [2, 2, 5],
    [2, 3, 1],
    [3, 1, 1],
    [3, 1, 3],
    [3, 3, 3],
    [3, 2, 4],
    [4, 1, 1],
    [4, 4, 1],
    [4, 5, 4],
    [4, 5, 6],
    [4, 5, 7],
    [5, 5, 5],
    [6, 6, 6],
    [7, 7, 7],
    [7, 8, 1],
];

const PREDICATE_TRIPLES: [[NodeId; 3]; 23] = [
    [1, 1, 1],
    [1, 1, 3],
    [1, 1, 4],
    [1, 3, 3],
    [1, 4, 2],
    [2, 2, 2],
    [2, 3, 2],
    [2, 4, 2],
    [2, 4, 3],
    [2, 5, 2],
    [3, 1, 1],
    [3, 1, 2],
    [3, 3, 3],
    [3, 4, 1],
    [4, 1, 1],
    [4, 1, 4],
    [5, 4, 4],
    [5, 6, 4],
    [5, 7, 4],
    [5, 5, 5],
    [6, 6, 6],
    [7, 7, 7],
    [8, 1, 7],
];

const SUBJECT_OBJECT_TRIPLES: [[NodeId; 3]; 23] = [
    [1, 1, 1],
    [1, 1, 3],
    [1, 1, 4],
    [1, 4, 3],
    [2, 1, 3],
    [2, 2, 2],
    [2, 3, 2],
    [2, 4, 1],
    [2, 4, 2],
    [2, 5, 2],
    [3, 1, 1],
    [3, 3, 1],
    [3, 3, 3],
    [3, 4, 2],
    [4, 1, 1],
    [4, 1, 4],
    [4, 4, 5],
    [4, 6, 5],
    [4, 7, 5],
    [5, 5, 5],
    [6, 6, 6],
    [7, 1, 8],
    [7, 7, 7],
];

fn loaded(triples: &[[NodeId; 3]]) -> (tempfile::TempDir, StatementStore) {
    let (dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    load_triples(&store, triples, FIXTURE_GRAPH);
    // Statements outside the graph must never leak into the results.
    store.add_triple(9, 9, 9, FIXTURE_GRAPH + 1).expect("add other graph");
    (dir, store)
}

fn x() -> ConstraintElement {
    ConstraintElement::var("x")
}

fn y() -> ConstraintElement {
    ConstraintElement::var("y")
}

/// Resolve `constraint`, check its columns and return its rows with the
/// row count it reports.
fn resolve_rows(
    store: &StatementStore,
    constraint: &Constraint,
    columns: &[&str],
) -> (BTreeSet<Vec<NodeId>>, u64) {
    let mut resolution = resolve(store, constraint, false).expect("resolve");
    assert!(matches!(resolution, Resolution::Duplicate(_)));
    let expected: Vec<Variable> = columns.iter().map(|name| Variable::new(*name)).collect();
    assert_eq!(resolution.variables(), expected.as_slice());

    let rows = row_set(&mut resolution);
    resolution.before_first(&[], 0).expect("before first");
    let count = resolution.row_count().expect("row count");
    (rows, count)
}

fn expected_rows(
    triples: &[[NodeId; 3]],
    keep: impl Fn(&[NodeId; 3]) -> bool,
    project: impl Fn(&[NodeId; 3]) -> Vec<NodeId>,
) -> BTreeSet<Vec<NodeId>> {
    triples.iter().filter(|t| keep(t)).map(project).collect()
}

#[test]
fn test_subject_equals_predicate() {
    let (_dir, store) = loaded(&SUBJECT_TRIPLES);
    let constraint = Constraint::new(x(), x(), y(), Node(FIXTURE_GRAPH));
    let (rows, count) = resolve_rows(&store, &constraint, &["x", "y"]);

    let expected = expected_rows(&SUBJECT_TRIPLES, |t| t[0] == t[1], |t| vec![t[0], t[2]]);
    assert_eq!(expected.len(), 10);
    assert_eq!(rows, expected);
    assert_eq!(count, 10);
}

#[test]
fn test_predicate_equals_object() {
    let (_dir, store) = loaded(&PREDICATE_TRIPLES);
    let constraint = Constraint::new(y(), x(), x(), Node(FIXTURE_GRAPH));
    let (rows, count) = resolve_rows(&store, &constraint, &["x", "y"]);

    let expected = expected_rows(&PREDICATE_TRIPLES, |t| t[1] == t[2], |t| vec![t[1], t[0]]);
    assert_eq!(expected.len(), 10);
    assert_eq!(rows, expected);
    assert_eq!(count, 10);
}

#[test]
fn test_subject_equals_object() {
    let (_dir, store) = loaded(&SUBJECT_OBJECT_TRIPLES);
    let constraint = Constraint::new(x(), y(), x(), Node(FIXTURE_GRAPH));
    let (rows, count) = resolve_rows(&store, &constraint, &["x", "y"]);

    let expected =
        expected_rows(&SUBJECT_OBJECT_TRIPLES, |t| t[0] == t[2], |t| vec![t[0], t[1]]);
    assert_eq!(expected.len(), 10);
    assert_eq!(rows, expected);
    assert_eq!(count, 10);
}

#[test]
fn test_all_three_equal() {
    let (_dir, store) = loaded(&SUBJECT_TRIPLES);
    let constraint = Constraint::new(x(), x(), x(), Node(FIXTURE_GRAPH));
    let (rows, count) = resolve_rows(&store, &constraint, &["x"]);

    let expected: BTreeSet<Vec<NodeId>> = [1, 2, 3, 5, 6, 7].map(|v| vec![v]).into();
    assert_eq!(rows, expected);
    assert_eq!(count, 6);
}

#[test]
fn test_all_equal_in_default_graph_scenario() {
    let (_dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    for [s, p, o] in [[1, 1, 1], [1, 2, 3], [2, 2, 2]] {
        store.add_triple(s, p, o, 1).expect("add");
    }

    let constraint = Constraint::new(x(), x(), x(), Node(1));
    let (rows, count) = resolve_rows(&store, &constraint, &["x"]);
    let expected: BTreeSet<Vec<NodeId>> = [vec![1], vec![2]].into();
    assert_eq!(rows, expected);
    assert_eq!(count, 2);
}

#[test]
fn test_prefix_restricts_to_one_diagonal_value() {
    let (_dir, store) = loaded(&SUBJECT_TRIPLES);
    let constraint = Constraint::new(x(), x(), y(), Node(FIXTURE_GRAPH));
    let mut resolution = resolve(&store, &constraint, false).expect("resolve");

    resolution.before_first(&[2], 0).expect("before first");
    let mut rows = Vec::new();
    while resolution.next().expect("next") {
        rows.push([
            resolution.column_value(0).expect("x"),
            resolution.column_value(1).expect("y"),
        ]);
    }
    assert_eq!(rows, vec![[2, 2], [2, 3], [2, 4], [2, 5]]);
    assert_eq!(resolution.row_count().expect("row count"), 4);

    resolution.before_first(&[4, 1], 0).expect("before first");
    assert!(resolution.next().expect("next"));
    assert!(!resolution.next().expect("next"));

    assert!(resolution.before_first(&[], 1).is_err());
}
