//! Negated constraints: every statement except the matching ones.
//!
//! The scan runs over an ordering whose leading columns are the bound
//! positions of the constraint, so the excluded statements form a single
//! run. It is stepped over the first time the scan reaches it. Row counts
//! come from two prefix counts rather than a scan.

use tracing::debug;

use crate::resolution::column_variable;
use crate::statement::{StatementSource, StoreError, StoreTuples, Tuples};
use crate::types::{Constraint, NONE, NodeId, Variable};

/// Which of subject, predicate and object are bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InverseKind {
    /// Subject; subject and predicate; or all three.
    Spo,
    /// Predicate; or predicate and object.
    Pos,
    /// Object only.
    Osp,
    /// Subject and object.
    Sop,
    /// Nothing bound: the negation excludes everything.
    Unconstrained,
}

impl InverseKind {
    const fn for_bound(subject: bool, predicate: bool, object: bool) -> Self {
        match (subject, predicate, object) {
            (true, false, false) | (true, true, false) | (true, true, true) => Self::Spo,
            (false, true, _) => Self::Pos,
            (false, false, true) => Self::Osp,
            (true, false, true) => Self::Sop,
            (false, false, false) => Self::Unconstrained,
        }
    }
}

/// The complement of a constraint, within its graph if the graph is bound.
///
/// All four columns are exposed, in the order of the scanned index.
#[derive(Debug, Clone)]
pub struct InverseResolution {
    base: StoreTuples,
    kind: InverseKind,
    graph: Option<NodeId>,
    /// Leading index columns of the excluded statements.
    exclude: Vec<NodeId>,
    variables: Vec<Variable>,
    /// Range of the current pass, in index columns.
    range: Vec<NodeId>,
    skipped: bool,
    forced_empty: bool,
    row_count: Option<u64>,
}

impl InverseResolution {
    pub(crate) fn new<S: StatementSource + ?Sized>(
        source: &S,
        constraint: &Constraint,
    ) -> Result<Self, StoreError> {
        let pattern = constraint.pattern();
        let [subject, predicate, object, graph] = pattern.to_array().map(|node| node != NONE);
        let kind = InverseKind::for_bound(subject, predicate, object);

        // A fully bound statement is looked for within its graph.
        let scan_bound = if subject && predicate && object && graph {
            [false, false, false, true]
        } else {
            [subject, predicate, object, graph]
        };
        let mut base = source.find_tuples_for_bound(scan_bound)?;
        let order = base.order();

        let bound_count = [subject, predicate, object, graph]
            .iter()
            .filter(|flag| **flag)
            .count();
        let exclude = order.to_key(&pattern)[..bound_count].to_vec();
        let graph = graph.then_some(pattern.graph);
        let range: Vec<NodeId> = graph.into_iter().collect();
        base.before_first(&range, 0)?;

        let variables = order
            .columns()
            .iter()
            .map(|column| column_variable(constraint, *column))
            .collect();
        debug!(constraint = %constraint, order = %order, ?kind, "inverse resolution");

        Ok(Self {
            base,
            kind,
            graph,
            exclude,
            variables,
            range,
            skipped: false,
            forced_empty: false,
            row_count: None,
        })
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[must_use]
    pub const fn kind(&self) -> InverseKind {
        self.kind
    }

    fn count_rows(&self) -> Result<u64, StoreError> {
        if self.forced_empty || self.kind == InverseKind::Unconstrained {
            return Ok(0);
        }
        let total = self.base.count_with(&self.range)?;
        let excluded = if self.exclude.starts_with(&self.range) {
            self.base.count_with(&self.exclude)?
        } else if self.range.starts_with(&self.exclude) {
            total
        } else {
            0
        };
        Ok(total - excluded)
    }
}

impl Tuples for InverseResolution {
    fn column_count(&self) -> usize {
        self.variables.len()
    }

    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError> {
        if suffix_truncation != 0 {
            return Err(StoreError::Validation(
                "suffix truncation is not supported for negated constraints".to_string(),
            ));
        }
        if prefix.len() > self.variables.len() {
            return Err(StoreError::Validation(format!(
                "prefix of {} columns exceeds {} columns",
                prefix.len(),
                self.variables.len()
            )));
        }

        self.skipped = false;
        self.forced_empty = false;
        self.row_count = None;
        self.range = match (self.graph, prefix.first()) {
            (Some(graph), None) => vec![graph],
            (Some(graph), Some(first)) => {
                self.forced_empty = *first != graph;
                prefix.to_vec()
            }
            (None, _) => prefix.to_vec(),
        };
        self.base.before_first(&self.range, 0)
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        if self.forced_empty || self.kind == InverseKind::Unconstrained {
            return Ok(false);
        }
        if !self.base.next()? {
            return Ok(false);
        }
        if !self.skipped
            && self
                .base
                .current_exposed()
                .is_some_and(|row| row.starts_with(&self.exclude))
        {
            self.skipped = true;
            return self.base.skip_past(&self.exclude);
        }
        Ok(true)
    }

    fn column_value(&self, column: usize) -> Result<NodeId, StoreError> {
        self.base.column_value(column)
    }

    fn row_count(&mut self) -> Result<u64, StoreError> {
        if let Some(count) = self.row_count {
            return Ok(count);
        }
        let count = self.count_rows()?;
        self.row_count = Some(count);
        Ok(count)
    }

    fn close(&mut self) {
        self.base.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_by_bound_positions() {
        assert_eq!(InverseKind::for_bound(true, false, false), InverseKind::Spo);
        assert_eq!(InverseKind::for_bound(true, true, true), InverseKind::Spo);
        assert_eq!(InverseKind::for_bound(false, true, true), InverseKind::Pos);
        assert_eq!(InverseKind::for_bound(false, false, true), InverseKind::Osp);
        assert_eq!(InverseKind::for_bound(true, false, true), InverseKind::Sop);
        assert_eq!(InverseKind::for_bound(false, false, false), InverseKind::Unconstrained);
    }
}
