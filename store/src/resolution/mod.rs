//! Resolution of constraints against a statement source.
//!
//! A [`Resolution`] is a [`Tuples`] cursor whose columns are named by the
//! variables of the constraint it answers:
//!
//! - [`DirectResolution`]: the index scan itself.
//! - [`DuplicateResolution`]: a constraint repeating a variable, such as
//!   `$x $x $o`, keeping only rows on the diagonal.
//! - [`InverseResolution`]: the negation of a constraint, every statement
//!   except the matching ones.

mod direct;
mod duplicate;
mod inverse;

pub use direct::DirectResolution;
pub use duplicate::DuplicateResolution;
pub use inverse::{InverseKind, InverseResolution};

use tracing::debug;

use crate::statement::{StatementSource, StoreError, Tuples};
use crate::types::{Constraint, NodeId, Variable};

const COLUMN_NAMES: [&str; 4] = ["subject", "predicate", "object", "graph"];

/// The variable naming statement column `column`. Bound columns that still
/// appear in a result are named after the column.
fn column_variable(constraint: &Constraint, column: usize) -> Variable {
    constraint
        .element(column)
        .variable()
        .cloned()
        .unwrap_or_else(|| Variable::new(COLUMN_NAMES[column]))
}

/// Pick and build the evaluator for a constraint.
///
/// With `negated` the result holds every statement that does not match,
/// within the constraint's graph if it has one.
pub fn resolve<S: StatementSource + ?Sized>(
    source: &S,
    constraint: &Constraint,
    negated: bool,
) -> Result<Resolution, StoreError> {
    if let Some(graph) = constraint.element(3).variable()
        && constraint.positions_of(graph).len() > 1
    {
        return Err(StoreError::Validation(format!(
            "graph variable {graph} also used in statement position of {constraint}"
        )));
    }

    let resolution = if negated {
        Resolution::Inverse(InverseResolution::new(source, constraint)?)
    } else if let Some(repeated) = repeated_positions(constraint) {
        Resolution::Duplicate(DuplicateResolution::new(source, constraint, &repeated)?)
    } else {
        Resolution::Direct(DirectResolution::new(source, constraint)?)
    };
    debug!(constraint = %constraint, resolution = resolution.kind(), "resolved constraint");
    Ok(resolution)
}

/// Subject, predicate and object positions sharing one variable, if any.
fn repeated_positions(constraint: &Constraint) -> Option<Vec<usize>> {
    constraint.elements()[..3]
        .iter()
        .filter_map(|element| element.variable())
        .map(|variable| constraint.positions_of(variable))
        .find(|positions| positions.len() > 1)
}

/// A cursor answering one constraint.
#[derive(Debug, Clone)]
pub enum Resolution {
    Direct(DirectResolution),
    Duplicate(DuplicateResolution),
    Inverse(InverseResolution),
}

impl Resolution {
    /// Variables naming the columns, in column order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        match self {
            Self::Direct(r) => r.variables(),
            Self::Duplicate(r) => r.variables(),
            Self::Inverse(r) => r.variables(),
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Duplicate(_) => "duplicate",
            Self::Inverse(_) => "inverse",
        }
    }

    fn inner(&self) -> &dyn Tuples {
        match self {
            Self::Direct(r) => r,
            Self::Duplicate(r) => r,
            Self::Inverse(r) => r,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Tuples {
        match self {
            Self::Direct(r) => r,
            Self::Duplicate(r) => r,
            Self::Inverse(r) => r,
        }
    }
}

impl Tuples for Resolution {
    fn column_count(&self) -> usize {
        self.inner().column_count()
    }

    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError> {
        self.inner_mut().before_first(prefix, suffix_truncation)
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        self.inner_mut().next()
    }

    fn column_value(&self, column: usize) -> Result<NodeId, StoreError> {
        self.inner().column_value(column)
    }

    fn row_count(&mut self) -> Result<u64, StoreError> {
        self.inner_mut().row_count()
    }

    fn close(&mut self) {
        self.inner_mut().close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::collect_rows;
    use crate::testing::open_temp_store;
    use crate::types::ConstraintElement::{self, Node};

    #[test]
    fn test_resolve_picks_evaluator() {
        let (_dir, store) = open_temp_store();
        store.clear_default().expect("clear");
        store.add_triple(1, 1, 2, 5).expect("add");

        let x = ConstraintElement::var("x");
        let direct = Constraint::new(x.clone(), ConstraintElement::var("y"), Node(2), Node(5));
        assert!(matches!(resolve(&store, &direct, false).expect("resolve"), Resolution::Direct(_)));

        let duplicate = Constraint::new(x.clone(), x, Node(2), Node(5));
        let mut resolution = resolve(&store, &duplicate, false).expect("resolve");
        assert!(matches!(resolution, Resolution::Duplicate(_)));
        assert_eq!(resolution.variables(), &[Variable::new("x")]);
        assert_eq!(collect_rows(&mut resolution).expect("rows"), vec![vec![1]]);

        let inverse = resolve(&store, &direct, true).expect("resolve");
        assert!(matches!(inverse, Resolution::Inverse(_)));
        assert_eq!(inverse.column_count(), 4);
    }

    #[test]
    fn test_graph_variable_reused_in_statement_is_rejected() {
        let (_dir, store) = open_temp_store();
        store.clear_default().expect("clear");
        let g = ConstraintElement::var("g");
        let constraint = Constraint::new(g.clone(), Node(1), Node(2), g);
        assert!(matches!(
            resolve(&store, &constraint, false),
            Err(StoreError::Validation(_))
        ));
    }
}
