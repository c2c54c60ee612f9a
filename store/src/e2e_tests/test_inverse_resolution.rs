//! Test negated constraints: the complement of the matches, within a graph.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::e2e_tests::helpers::*;
use crate::resolution::{InverseKind, Resolution, resolve};
use crate::statement::{StatementStore, Tuples, collect_rows};
use crate::testing::open_temp_store;
use crate::types::{NONE, NodeId, Quad};

fn random_store(seed: u64) -> (tempfile::TempDir, StatementStore) {
    let (dir, store) = open_temp_store();
    store.clear_default().expect("clear");
    let mut rng = StdRng::seed_from_u64(seed);
    for _ in 0..300 {
        let quad = random_quad(&mut rng, 5);
        store
            .add_triple(quad.subject, quad.predicate, quad.object, quad.graph)
            .expect("add");
    }
    (dir, store)
}

/// Check the complement of `pattern` against a filter over every statement.
fn check_complement(store: &StatementStore, pattern: [Option<NodeId>; 4], kind: InverseKind) {
    let constraint = column_constraint(pattern);
    let mut resolution = resolve(store, &constraint, true).expect("resolve");
    let Resolution::Inverse(inverse) = &resolution else {
        panic!("expected an inverse resolution for {constraint}");
    };
    assert_eq!(inverse.kind(), kind, "{constraint}");

    let variables = resolution.variables().to_vec();
    let rows: Vec<Quad> = collect_rows(&mut resolution)
        .expect("rows")
        .iter()
        .map(|row| row_quad(&variables, row))
        .collect();

    let matched = Quad::from_array([0, 1, 2, 3].map(|column| pattern[column].unwrap_or(NONE)));
    let graph = Quad::new(NONE, NONE, NONE, pattern[3].unwrap_or(NONE));
    let expected: Vec<Quad> = all_quads(store)
        .into_iter()
        .filter(|quad| matches(quad, &graph) && !matches(quad, &matched))
        .collect();

    let mut sorted = rows.clone();
    sorted.sort();
    assert_eq!(sorted, expected, "{constraint}");
    assert!(rows.iter().all(|quad| !matches(quad, &matched)));

    let in_graph = all_quads(store).iter().filter(|quad| matches(quad, &graph)).count();
    let matching = all_quads(store).iter().filter(|quad| matches(quad, &matched)).count();
    resolution.before_first(&[], 0).expect("before first");
    assert_eq!(
        resolution.row_count().expect("row count"),
        (in_graph - matching) as u64,
        "{constraint}"
    );
}

#[test]
fn test_complement_within_graph() {
    let (_dir, store) = random_store(21);
    let g = Some(2);
    check_complement(&store, [Some(3), None, None, g], InverseKind::Spo);
    check_complement(&store, [Some(3), Some(1), None, g], InverseKind::Spo);
    check_complement(&store, [Some(3), Some(1), Some(4), g], InverseKind::Spo);
    check_complement(&store, [None, Some(5), None, g], InverseKind::Pos);
    check_complement(&store, [None, Some(5), Some(2), g], InverseKind::Pos);
    check_complement(&store, [None, None, Some(1), g], InverseKind::Osp);
    check_complement(&store, [Some(4), None, Some(1), g], InverseKind::Sop);
}

#[test]
fn test_complement_across_graphs() {
    let (_dir, store) = random_store(22);
    check_complement(&store, [Some(1), None, None, None], InverseKind::Spo);
    check_complement(&store, [None, Some(2), Some(3), None], InverseKind::Pos);
    check_complement(&store, [None, None, Some(5), None], InverseKind::Osp);
    check_complement(&store, [Some(2), None, Some(2), None], InverseKind::Sop);
}

#[test]
fn test_unconstrained_negation_is_empty() {
    let (_dir, store) = random_store(23);
    let constraint = column_constraint([None, None, None, Some(1)]);
    let mut resolution = resolve(&store, &constraint, true).expect("resolve");
    assert_eq!(collect_rows(&mut resolution).expect("rows"), Vec::<Vec<NodeId>>::new());
    assert_eq!(resolution.row_count().expect("row count"), 0);
}

#[test]
fn test_prefix_outside_graph_is_empty() {
    let (_dir, store) = random_store(24);
    let constraint = column_constraint([Some(1), None, None, Some(2)]);
    let mut resolution = resolve(&store, &constraint, true).expect("resolve");

    resolution.before_first(&[3], 0).expect("before first");
    assert!(!resolution.next().expect("next"));
    assert_eq!(resolution.row_count().expect("row count"), 0);

    // Column 0 is the graph; a prefix on it keeps the complement.
    resolution.before_first(&[2], 0).expect("before first");
    let mut rows = 0;
    while resolution.next().expect("next") {
        assert_eq!(resolution.column_value(0).expect("graph"), 2);
        assert_ne!(resolution.column_value(1).expect("subject"), 1);
        rows += 1;
    }
    assert_eq!(resolution.row_count().expect("row count"), rows);
}
