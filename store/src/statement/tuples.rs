//! Cursors over statements.
//!
//! [`Tuples`] is the pull-based cursor every evaluator exposes. A cursor is
//! positioned before the first row by [`Tuples::before_first`], optionally
//! restricted to rows starting with a prefix of its columns, and then moved
//! with [`Tuples::next`].
//!
//! [`StoreTuples`] is the plain scan of one index within one phase. It holds
//! a [`PhaseToken`], so the phase it reads stays intact until the cursor is
//! closed or dropped. Cloning a cursor copies its position and takes another
//! token.

use std::sync::Arc;

use crate::statement::error::StoreError;
use crate::statement::ordering::IndexOrder;
use crate::statement::phase::{IndexRoot, PhaseToken};
use crate::storage::IndexFile;
use crate::storage::btree::{Key, TreeCursor, TreeError};
use crate::storage::index_file::{lower_bound, prefix_successor};
use crate::types::{COLUMNS, NodeId, Quad};

/// A cursor over rows of node ids.
pub trait Tuples {
    /// Number of columns in each row.
    fn column_count(&self) -> usize;

    /// Position before the first row whose leading columns equal `prefix`.
    ///
    /// With `suffix_truncation > 0` only rows that differ in their first
    /// `column_count() - suffix_truncation` columns are returned.
    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError>;

    /// Move to the next row. Returns false once the rows are exhausted.
    fn next(&mut self) -> Result<bool, StoreError>;

    /// Value of `column` in the current row.
    fn column_value(&self, column: usize) -> Result<NodeId, StoreError>;

    /// Number of rows under the current prefix and truncation.
    fn row_count(&mut self) -> Result<u64, StoreError>;

    /// True if the rows are exact. Always the case for this store.
    fn is_complete(&self) -> bool {
        true
    }

    /// Release the phase held by the cursor. Further use is a state error.
    fn close(&mut self);
}

/// Collect every row of a cursor from the start.
pub fn collect_rows<T: Tuples + ?Sized>(tuples: &mut T) -> Result<Vec<Vec<NodeId>>, StoreError> {
    tuples.before_first(&[], 0)?;
    let mut rows = Vec::new();
    while tuples.next()? {
        let row = (0..tuples.column_count())
            .map(|column| tuples.column_value(column))
            .collect::<Result<Vec<_>, _>>()?;
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ScanState {
    /// Before the first row; the scan starts at the given key.
    Pending(Key),
    Positioned(Key),
    Exhausted,
}

/// A scan of one index in one phase.
#[derive(Clone)]
pub struct StoreTuples {
    index: Arc<IndexFile>,
    token: Option<PhaseToken>,
    root: IndexRoot,
    /// Leading index columns bound by the query.
    fixed: Vec<NodeId>,
    /// Statement column of each exposed column, in index order.
    columns: Vec<usize>,
    forced_empty: bool,
    /// `fixed` followed by the caller's prefix.
    range_prefix: Vec<NodeId>,
    truncation: usize,
    cursor: TreeCursor,
    state: ScanState,
}

impl StoreTuples {
    /// A scan of `index` in the phase held by `token`, with the first
    /// `fixed.len()` index columns bound to `fixed`.
    pub(crate) fn new(index: Arc<IndexFile>, token: PhaseToken, fixed: Vec<NodeId>) -> Self {
        let order = index.order();
        let root = token.roots().get(order);
        let columns = order.columns()[fixed.len().min(COLUMNS)..].to_vec();
        let range_prefix = fixed.clone();
        Self {
            index,
            token: Some(token),
            root,
            state: ScanState::Pending(lower_bound(&range_prefix)),
            fixed,
            columns,
            forced_empty: false,
            range_prefix,
            truncation: 0,
            cursor: TreeCursor::default(),
        }
    }

    /// A scan that has no rows, with the columns `fixed` would leave.
    pub(crate) fn empty(index: Arc<IndexFile>, token: PhaseToken, fixed: Vec<NodeId>) -> Self {
        let mut tuples = Self::new(index, token, fixed);
        tuples.forced_empty = true;
        tuples.state = ScanState::Exhausted;
        tuples
    }

    #[must_use]
    pub fn order(&self) -> IndexOrder {
        self.index.order()
    }

    /// Statement column (0 subject .. 3 graph) behind each exposed column.
    #[must_use]
    pub fn statement_columns(&self) -> &[usize] {
        &self.columns
    }

    /// The phase this scan reads, if it is still open.
    #[must_use]
    pub const fn token(&self) -> Option<&PhaseToken> {
        self.token.as_ref()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.token.is_none() {
            return Err(StoreError::State("tuples used after close".to_string()));
        }
        Ok(())
    }

    fn io(&self, operation: &str, e: TreeError) -> StoreError {
        StoreError::io(
            format!("{operation} on {} with prefix {:?}", self.index.order(), self.range_prefix),
            e,
        )
    }

    fn in_range(&self, key: &Key) -> bool {
        key.starts_with(&self.range_prefix)
    }

    /// Position the underlying cursor at the first key at or after `key` and
    /// report whether it is still within range.
    fn seek_key(&mut self, key: &Key) -> Result<bool, StoreError> {
        self.cursor = self
            .index
            .seek(self.root, key)
            .map_err(|e| self.io("seek", e))?;
        Ok(self.settle())
    }

    fn settle(&mut self) -> bool {
        match self.cursor.current() {
            Some(key) if self.in_range(&key) => {
                self.state = ScanState::Positioned(key);
                true
            }
            _ => {
                self.state = ScanState::Exhausted;
                false
            }
        }
    }

    /// The exposed columns of the current row.
    pub(crate) fn current_exposed(&self) -> Option<&[NodeId]> {
        match &self.state {
            ScanState::Positioned(key) => Some(&key[self.fixed.len()..]),
            _ => None,
        }
    }

    /// The whole statement under the cursor.
    pub(crate) fn current_quad(&self) -> Option<Quad> {
        match &self.state {
            ScanState::Positioned(key) => Some(self.index.order().to_quad(key)),
            _ => None,
        }
    }

    /// Move to the first row whose exposed columns are at or after `target`
    /// (padded with the smallest node id). Used for skip scans.
    pub(crate) fn reposition(&mut self, target: &[NodeId]) -> Result<bool, StoreError> {
        self.check_open()?;
        if self.forced_empty {
            return Ok(false);
        }
        let mut full = self.fixed.clone();
        full.extend_from_slice(target);
        let key = lower_bound(&full).max(lower_bound(&self.range_prefix));
        self.seek_key(&key)
    }

    /// Move past every row whose exposed columns start with `prefix`.
    pub(crate) fn skip_past(&mut self, prefix: &[NodeId]) -> Result<bool, StoreError> {
        self.check_open()?;
        if self.forced_empty {
            return Ok(false);
        }
        let mut full = self.fixed.clone();
        full.extend_from_slice(prefix);
        match prefix_successor(&full) {
            Some(key) => self.seek_key(&key),
            None => {
                self.state = ScanState::Exhausted;
                Ok(false)
            }
        }
    }

    /// Number of rows whose exposed columns start with `prefix`, ignoring
    /// the current position and range.
    pub(crate) fn count_with(&self, prefix: &[NodeId]) -> Result<u64, StoreError> {
        self.check_open()?;
        if self.forced_empty {
            return Ok(0);
        }
        let mut full = self.fixed.clone();
        full.extend_from_slice(prefix);
        self.index
            .count_prefix(self.root, &full)
            .map_err(|e| self.io("count", e))
    }
}

impl Tuples for StoreTuples {
    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn before_first(&mut self, prefix: &[NodeId], suffix_truncation: usize) -> Result<(), StoreError> {
        self.check_open()?;
        if prefix.len() + suffix_truncation > self.columns.len() {
            return Err(StoreError::Validation(format!(
                "prefix of {} columns with truncation {suffix_truncation} exceeds {} columns",
                prefix.len(),
                self.columns.len()
            )));
        }
        self.range_prefix.truncate(self.fixed.len());
        self.range_prefix.extend_from_slice(prefix);
        self.truncation = suffix_truncation;
        self.state = if self.forced_empty {
            ScanState::Exhausted
        } else {
            ScanState::Pending(lower_bound(&self.range_prefix))
        };
        Ok(())
    }

    fn next(&mut self) -> Result<bool, StoreError> {
        self.check_open()?;
        match self.state.clone() {
            ScanState::Exhausted => Ok(false),
            ScanState::Pending(start) => self.seek_key(&start),
            ScanState::Positioned(key) => {
                if self.truncation > 0 {
                    let distinct = self.fixed.len() + self.columns.len() - self.truncation;
                    match prefix_successor(&key[..distinct]) {
                        Some(next) => self.seek_key(&next),
                        None => {
                            self.state = ScanState::Exhausted;
                            Ok(false)
                        }
                    }
                } else {
                    let index = Arc::clone(&self.index);
                    index
                        .advance(&mut self.cursor)
                        .map_err(|e| self.io("advance", e))?;
                    Ok(self.settle())
                }
            }
        }
    }

    fn column_value(&self, column: usize) -> Result<NodeId, StoreError> {
        self.check_open()?;
        if column >= self.columns.len() - self.truncation {
            return Err(StoreError::Validation(format!(
                "column {column} out of range for {} columns",
                self.columns.len() - self.truncation
            )));
        }
        match &self.state {
            ScanState::Positioned(key) => Ok(key[self.fixed.len() + column]),
            _ => Err(StoreError::State("tuples not positioned on a row".to_string())),
        }
    }

    fn row_count(&mut self) -> Result<u64, StoreError> {
        self.check_open()?;
        if self.forced_empty {
            return Ok(0);
        }
        if self.truncation == 0 {
            return self
                .index
                .count_prefix(self.root, &self.range_prefix)
                .map_err(|e| self.io("count", e));
        }

        let mut rows = self.clone();
        rows.state = ScanState::Pending(lower_bound(&self.range_prefix));
        let mut count = 0;
        while rows.next()? {
            count += 1;
        }
        Ok(count)
    }

    fn close(&mut self) {
        self.token = None;
        self.state = ScanState::Exhausted;
    }
}

impl std::fmt::Debug for StoreTuples {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreTuples")
            .field("order", &self.index.order())
            .field("fixed", &self.fixed)
            .field("range_prefix", &self.range_prefix)
            .field("truncation", &self.truncation)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
