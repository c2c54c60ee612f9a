use crate::resolution::column_variable;
use crate::statement::{StatementSource, StoreError, StoreTuples, Tuples};
use crate::types::{Constraint, NodeId, Variable};

/// A constraint without repeated variables, answered by one index scan.
///
/// The columns are the unbound positions in the order of the chosen index.
#[derive(Debug, Clone)]
pub struct DirectResolution {
    tuples: StoreTuples,
    variables: Vec<Variable>,
}

impl DirectResolution {
    pub(crate) fn new<S: StatementSource + ?Sized>(
        source: &S,
        constraint: &Constraint,
    ) -> Result<Self, StoreError> {
        let tuples = source.find_tuples(&constraint.pattern())?;
        let variables = tuples
            .statement_columns()
            .iter()
            .map(|column| column_variable(constraint, *column))
            .collect();
        Ok(Self { tuples, variables })
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl Tuples for DirectResolution {
    fn column_count(&self) -> usize {
        self.tuples.column_count()
    }

    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError> {
        self.tuples.before_first(prefix, suffix_truncation)
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        self.tuples.next()
    }

    fn column_value(&self, column: usize) -> Result<NodeId, StoreError> {
        self.tuples.column_value(column)
    }

    fn row_count(&mut self) -> Result<u64, StoreError> {
        self.tuples.row_count()
    }

    fn close(&mut self) {
        self.tuples.close();
    }
}
