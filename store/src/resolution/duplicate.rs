//! Constraints that repeat a variable.
//!
//! No index holds the diagonal `s == p` (or `s == p == o`) directly. The
//! base scan is taken over an ordering that puts the repeated positions
//! right after the bound ones, so each candidate value `v` is one contiguous
//! run `(v, v, ..)`. Rows off the diagonal are skipped by seeking straight to
//! the next diagonal candidate.

use tracing::debug;

use crate::resolution::column_variable;
use crate::statement::{Mask, StatementSource, StoreError, StoreTuples, Tuples, mask_for};
use crate::types::{Constraint, NodeId, Variable};

/// Where the diagonal continues from a row that may be off it.
#[derive(Debug, PartialEq, Eq)]
enum Diagonal {
    On,
    Seek(Vec<NodeId>),
    Exhausted,
}

/// The next diagonal key at or after `lead`, the repeated columns of a row.
fn next_diagonal(lead: &[NodeId]) -> Diagonal {
    let Some((&first, rest)) = lead.split_first() else {
        return Diagonal::On;
    };
    match rest.iter().find(|value| **value != first) {
        None => Diagonal::On,
        Some(value) if *value < first => Diagonal::Seek(vec![first; lead.len()]),
        Some(_) => first
            .checked_add(1)
            .map_or(Diagonal::Exhausted, |next| Diagonal::Seek(vec![next; lead.len()])),
    }
}

/// Advance `base` until it rests on a diagonal row, returning false once the
/// scan runs out.
fn settle(base: &mut StoreTuples, width: usize) -> Result<bool, StoreError> {
    loop {
        let target = match base.current_exposed() {
            None => return Ok(false),
            Some(columns) => next_diagonal(&columns[..width]),
        };
        match target {
            Diagonal::On => return Ok(true),
            Diagonal::Exhausted => return Ok(false),
            Diagonal::Seek(key) => {
                if !base.reposition(&key)? {
                    return Ok(false);
                }
            }
        }
    }
}

/// A constraint with two or three of subject, predicate and object sharing
/// a variable.
///
/// The shared variable is column 0; the other free positions follow in index
/// order. Suffix truncation is not supported.
#[derive(Debug, Clone)]
pub struct DuplicateResolution {
    base: StoreTuples,
    /// Number of positions forced equal: 2 or 3.
    width: usize,
    variables: Vec<Variable>,
    /// Exposed base column behind each column.
    column_map: Vec<usize>,
    /// Current range in base columns, the shared value repeated `width` times.
    prefix: Vec<NodeId>,
    row_count: Option<u64>,
}

impl DuplicateResolution {
    pub(crate) fn new<S: StatementSource + ?Sized>(
        source: &S,
        constraint: &Constraint,
        repeated: &[usize],
    ) -> Result<Self, StoreError> {
        let width = repeated.len();
        if !(2..=3).contains(&width) {
            return Err(StoreError::Validation(format!(
                "{constraint} repeats a variable in {width} positions"
            )));
        }

        let pattern = constraint.pattern();
        let duplicated: Mask = repeated.iter().fold(0, |mask, position| mask | (1 << position));
        let base = source.find_tuples_with_mask(mask_for(&pattern) | duplicated, &pattern)?;

        let exposed = base.statement_columns();
        if exposed.len() < width || exposed[..width].iter().any(|column| !repeated.contains(column)) {
            return Err(StoreError::Fatal(format!(
                "{} does not lead with the repeated positions of {constraint}",
                base.order()
            )));
        }

        let mut variables = vec![column_variable(constraint, exposed[0])];
        let mut column_map = vec![0];
        for (index, column) in exposed.iter().enumerate().skip(width) {
            variables.push(column_variable(constraint, *column));
            column_map.push(index);
        }
        debug!(
            constraint = %constraint,
            order = %base.order(),
            width,
            "duplicate variable resolution"
        );

        Ok(Self {
            base,
            width,
            variables,
            column_map,
            prefix: Vec::new(),
            row_count: None,
        })
    }

    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn count_rows(&self) -> Result<u64, StoreError> {
        if !self.prefix.is_empty() {
            return self.base.count_with(&self.prefix);
        }

        let mut walker = self.base.clone();
        walker.before_first(&[], 0)?;
        let mut count = 0;
        let mut more = walker.next()? && settle(&mut walker, self.width)?;
        while more {
            let diagonal = match walker.current_exposed() {
                Some(columns) => vec![columns[0]; self.width],
                None => break,
            };
            count += walker.count_with(&diagonal)?;
            more = walker.skip_past(&diagonal)? && settle(&mut walker, self.width)?;
        }
        Ok(count)
    }
}

impl Tuples for DuplicateResolution {
    fn column_count(&self) -> usize {
        self.variables.len()
    }

    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError> {
        if suffix_truncation != 0 {
            return Err(StoreError::Validation(
                "suffix truncation is not supported for repeated variables".to_string(),
            ));
        }
        if prefix.len() > self.variables.len() {
            return Err(StoreError::Validation(format!(
                "prefix of {} columns exceeds {} columns",
                prefix.len(),
                self.variables.len()
            )));
        }

        let mut expanded = Vec::with_capacity(prefix.len() + self.width);
        if let Some((&shared, rest)) = prefix.split_first() {
            expanded.resize(self.width, shared);
            expanded.extend_from_slice(rest);
        }
        self.base.before_first(&expanded, 0)?;
        if expanded != self.prefix {
            self.row_count = None;
        }
        self.prefix = expanded;
        Ok(())
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        Ok(self.base.next()? && settle(&mut self.base, self.width)?)
    }

    fn column_value(&self, column: usize) -> Result<NodeId, StoreError> {
        let mapped = self.column_map.get(column).ok_or_else(|| {
            StoreError::Validation(format!(
                "column {column} out of range for {} columns",
                self.column_map.len()
            ))
        })?;
        self.base.column_value(*mapped)
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
    fn test_next_diagonal() {
        assert_eq!(next_diagonal(&[3, 3]), Diagonal::On);
        assert_eq!(next_diagonal(&[3, 1]), Diagonal::Seek(vec![3, 3]));
        assert_eq!(next_diagonal(&[3, 5]), Diagonal::Seek(vec![4, 4]));
        assert_eq!(next_diagonal(&[2, 2, 1]), Diagonal::Seek(vec![2, 2, 2]));
        assert_eq!(next_diagonal(&[2, 2, 7]), Diagonal::Seek(vec![3, 3, 3]));
        assert_eq!(next_diagonal(&[2, 1, 9]), Diagonal::Seek(vec![2, 2, 2]));
        assert_eq!(next_diagonal(&[NodeId::MAX, 0]), Diagonal::Seek(vec![NodeId::MAX; 2]));
    }
}
