//! Read-only views pinned to a committed phase.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::statement::error::StoreError;
use crate::statement::ordering::{IndexOrder, Mask, mask_of};
use crate::statement::phase::PhaseToken;
use crate::statement::store::{StoreShared, exists_in, scan, select_order, select_order_with_mask};
use crate::statement::tuples::StoreTuples;
use crate::types::{NodeId, Quad};

/// A view of the last committed phase of a store.
///
/// Writes to the store never show through. [`Self::refresh`] moves the view
/// to whatever has been committed since.
pub struct ReadOnlyStatementStore {
    shared: Arc<StoreShared>,
    token: Mutex<Option<PhaseToken>>,
}

impl ReadOnlyStatementStore {
    pub(crate) fn new(shared: Arc<StoreShared>, token: PhaseToken) -> Self {
        Self {
            shared,
            token: Mutex::new(Some(token)),
        }
    }

    fn token(&self) -> Result<PhaseToken, StoreError> {
        self.token
            .lock()
            .map_err(|_| StoreError::poisoned())?
            .clone()
            .ok_or_else(|| StoreError::State("read-only view has been released".to_string()))
    }

    /// Move the view to the most recently committed phase.
    pub fn refresh(&self) -> Result<(), StoreError> {
        let committed = self
            .shared
            .committed_token()?
            .ok_or_else(|| StoreError::State("store has no committed phase".to_string()))?;
        debug!(generation = committed.generation(), "refreshed read-only view");
        *self.token.lock().map_err(|_| StoreError::poisoned())? = Some(committed);
        Ok(())
    }

    /// Let go of the phase. The view is unusable until refreshed.
    pub fn release(&self) -> Result<(), StoreError> {
        self.token.lock().map_err(|_| StoreError::poisoned())?.take();
        Ok(())
    }

    pub fn nr_triples(&self) -> Result<u64, StoreError> {
        Ok(self.token()?.roots().count())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.nr_triples()? == 0)
    }

    pub fn exists_triples(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<bool, StoreError> {
        let token = self.token()?;
        exists_in(
            &self.shared,
            token.roots(),
            &Quad::new(subject, predicate, object, graph),
        )
    }

    pub fn find_tuples(
        &self,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<StoreTuples, StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let (order, bound) = select_order(&pattern);
        Ok(scan(&self.shared, self.token()?, order, &pattern, bound))
    }

    pub fn find_tuples_with_mask(
        &self,
        mask: Mask,
        subject: NodeId,
        predicate: NodeId,
        object: NodeId,
        graph: NodeId,
    ) -> Result<StoreTuples, StoreError> {
        let pattern = Quad::new(subject, predicate, object, graph);
        let (order, bound) = select_order_with_mask(mask, &pattern)?;
        Ok(scan(&self.shared, self.token()?, order, &pattern, bound))
    }

    pub fn find_tuples_for_bound(
        &self,
        subject_bound: bool,
        predicate_bound: bool,
        object_bound: bool,
        graph_bound: bool,
    ) -> Result<StoreTuples, StoreError> {
        let mask = mask_of([subject_bound, predicate_bound, object_bound, graph_bound]);
        Ok(scan(
            &self.shared,
            self.token()?,
            IndexOrder::for_mask(mask),
            &Quad::default(),
            0,
        ))
    }
}

impl std::fmt::Debug for ReadOnlyStatementStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let generation = self
            .token
            .lock()
            .ok()
            .and_then(|token| token.as_ref().map(PhaseToken::generation));
        f.debug_struct("ReadOnlyStatementStore")
            .field("generation", &generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use crate::statement::error::StoreError;
    use crate::statement::tuples::{Tuples, collect_rows};
    use crate::testing::open_temp_store;
    use crate::types::NONE;

    #[test]
    fn test_view_sees_only_committed_statements() {
        let (_dir, store) = open_temp_store();
        store.clear_default().expect("clear");
        store.add_triple(1, 2, 3, 4).expect("add");
        store.prepare().expect("prepare");
        store.commit().expect("commit");

        let view = store.new_read_only().expect("view");
        store.add_triple(5, 6, 7, 8).expect("add after commit");

        assert_eq!(view.nr_triples().expect("count"), 1);
        assert!(!view.exists_triples(5, NONE, NONE, NONE).expect("exists"));
        let mut rows = view.find_tuples(NONE, NONE, NONE, 4).expect("find");
        assert_eq!(collect_rows(&mut rows).expect("rows"), vec![vec![1, 2, 3]]);

        store.prepare().expect("prepare");
        store.commit().expect("commit");
        assert_eq!(view.nr_triples().expect("count"), 1);
        view.refresh().expect("refresh");
        assert_eq!(view.nr_triples().expect("count"), 2);
    }

    #[test]
    fn test_released_view_rejects_reads() {
        let (_dir, store) = open_temp_store();
        store.clear_default().expect("clear");
        let view = store.new_read_only().expect("view");
        let mut open_cursor = view.find_tuples(NONE, NONE, NONE, NONE).expect("find");

        view.release().expect("release");
        assert!(matches!(view.nr_triples(), Err(StoreError::State(_))));
        assert!(!open_cursor.next().expect("cursor keeps its own phase"));
    }

    #[test]
    fn test_view_of_uninitialized_store_fails() {
        let (_dir, store) = open_temp_store();
        assert!(matches!(store.new_read_only(), Err(StoreError::State(_))));
    }
}
