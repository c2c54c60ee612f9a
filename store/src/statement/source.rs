use crate::statement::error::StoreError;
use crate::statement::ordering::Mask;
use crate::statement::read_only::ReadOnlyStatementStore;
use crate::statement::store::StatementStore;
use crate::statement::tuples::StoreTuples;
use crate::types::Quad;

/// Anything statements can be read from: the store itself or a read-only
/// view of it.
pub trait StatementSource {
    /// Statements matching `pattern`; [`crate::types::NONE`] columns are free.
    fn find_tuples(&self, pattern: &Quad) -> Result<StoreTuples, StoreError>;

    /// Statements matching `pattern`, exposed in the ordering chosen by
    /// `mask` for the free columns.
    fn find_tuples_with_mask(&self, mask: Mask, pattern: &Quad) -> Result<StoreTuples, StoreError>;

    /// Every statement, ordered for later binding of the flagged columns.
    fn find_tuples_for_bound(&self, bound: [bool; 4]) -> Result<StoreTuples, StoreError>;

    fn exists_triples(&self, pattern: &Quad) -> Result<bool, StoreError>;
}

impl StatementSource for StatementStore {
    fn find_tuples(&self, pattern: &Quad) -> Result<StoreTuples, StoreError> {
        Self::find_tuples(self, pattern.subject, pattern.predicate, pattern.object, pattern.graph)
    }

    fn find_tuples_with_mask(&self, mask: Mask, pattern: &Quad) -> Result<StoreTuples, StoreError> {
        Self::find_tuples_with_mask(
            self,
            mask,
            pattern.subject,
            pattern.predicate,
            pattern.object,
            pattern.graph,
        )
    }

    fn find_tuples_for_bound(&self, bound: [bool; 4]) -> Result<StoreTuples, StoreError> {
        let [s, p, o, g] = bound;
        Self::find_tuples_for_bound(self, s, p, o, g)
    }

    fn exists_triples(&self, pattern: &Quad) -> Result<bool, StoreError> {
        Self::exists_triples(self, pattern.subject, pattern.predicate, pattern.object, pattern.graph)
    }
}

impl StatementSource for ReadOnlyStatementStore {
    fn find_tuples(&self, pattern: &Quad) -> Result<StoreTuples, StoreError> {
        Self::find_tuples(self, pattern.subject, pattern.predicate, pattern.object, pattern.graph)
    }

    fn find_tuples_with_mask(&self, mask: Mask, pattern: &Quad) -> Result<StoreTuples, StoreError> {
        Self::find_tuples_with_mask(
            self,
            mask,
            pattern.subject,
            pattern.predicate,
            pattern.object,
            pattern.graph,
        )
    }

    fn find_tuples_for_bound(&self, bound: [bool; 4]) -> Result<StoreTuples, StoreError> {
        let [s, p, o, g] = bound;
        Self::find_tuples_for_bound(self, s, p, o, g)
    }

    fn exists_triples(&self, pattern: &Quad) -> Result<bool, StoreError> {
        Self::exists_triples(self, pattern.subject, pattern.predicate, pattern.object, pattern.graph)
    }
}
