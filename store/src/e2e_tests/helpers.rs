//! Common helpers for end-to-end tests.

use std::collections::BTreeSet;

use rand::Rng;
use rand::rngs::StdRng;

use crate::statement::{StatementStore, Tuples, collect_rows};
use crate::types::{COLUMNS, Constraint, ConstraintElement, NodeId, Quad, Variable};

/// Graph the resolution fixtures are loaded into.
pub const FIXTURE_GRAPH: NodeId = 100;

/// Add every `(s, p, o)` of `triples` to `graph`.
pub fn load_triples(store: &StatementStore, triples: &[[NodeId; 3]], graph: NodeId) {
    for [subject, predicate, object] in triples {
        store
            .add_triple(*subject, *predicate, *object, graph)
            .expect("add fixture triple");
    }
}

/// Prepare and commit the current phase.
pub fn commit(store: &StatementStore) {
    store.prepare().expect("prepare");
    store.commit().expect("commit");
}

/// Every statement in the store, in SPOG order.
pub fn all_quads(store: &StatementStore) -> Vec<Quad> {
    let mut tuples = store.find_tuples(0, 0, 0, 0).expect("scan all");
    collect_rows(&mut tuples)
        .expect("rows")
        .into_iter()
        .map(|row| Quad::new(row[0], row[1], row[2], row[3]))
        .collect()
}

/// A random statement with every column in `1..=range`.
pub fn random_quad(rng: &mut StdRng, range: NodeId) -> Quad {
    Quad::new(
        rng.random_range(1..=range),
        rng.random_range(1..=range),
        rng.random_range(1..=range),
        rng.random_range(1..=range),
    )
}

/// Every row of a cursor, as a set.
pub fn row_set<T: Tuples + ?Sized>(tuples: &mut T) -> BTreeSet<Vec<NodeId>> {
    collect_rows(tuples).expect("rows").into_iter().collect()
}

/// A constraint whose free positions are named after their columns, so a
/// result row can be mapped back onto a statement with [`row_quad`].
pub fn column_constraint(pattern: [Option<NodeId>; COLUMNS]) -> Constraint {
    const NAMES: [&str; COLUMNS] = ["subject", "predicate", "object", "graph"];
    let [s, p, o, g] = [0, 1, 2, 3].map(|position| {
        pattern[position].map_or_else(
            || ConstraintElement::var(NAMES[position]),
            ConstraintElement::Node,
        )
    });
    Constraint::new(s, p, o, g)
}

/// Map a four column row named by column variables back onto a statement.
pub fn row_quad(variables: &[Variable], row: &[NodeId]) -> Quad {
    let mut columns = [0; COLUMNS];
    for (variable, value) in variables.iter().zip(row) {
        let position = match variable.name() {
            "subject" => 0,
            "predicate" => 1,
            "object" => 2,
            "graph" => 3,
            other => panic!("unexpected column variable {other}"),
        };
        columns[position] = *value;
    }
    Quad::from_array(columns)
}

/// True if `quad` matches `pattern`, where [`crate::types::NONE`] matches any value.
pub fn matches(quad: &Quad, pattern: &Quad) -> bool {
    quad.to_array()
        .iter()
        .zip(pattern.to_array())
        .all(|(value, bound)| bound == crate::types::NONE || *value == bound)
}
