//! Node identifiers and quads.
//!
//! Node identifiers are opaque to the store: they are minted by the node
//! pool and only compared and sorted here.

use std::fmt;

/// A node identifier.
pub type NodeId = i64;

/// The unbound node. In a pattern it matches any value.
pub const NONE: NodeId = 0;

/// The lowest node identifier that may be stored.
pub const MIN_NODE: NodeId = 1;

/// Number of columns in a statement (subject, predicate, object, graph).
pub const COLUMNS: usize = 4;

/// A statement, or a statement pattern when some columns are [`NONE`].
///
/// Column `0` is the subject, `1` the predicate, `2` the object and `3` the
/// graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Quad {
    pub subject: NodeId,
    pub predicate: NodeId,
    pub object: NodeId,
    pub graph: NodeId,
}

impl Quad {
    #[must_use]
    pub const fn new(subject: NodeId, predicate: NodeId, object: NodeId, graph: NodeId) -> Self {
        Self {
            subject,
            predicate,
            object,
            graph,
        }
    }

    /// The columns in subject, predicate, object, graph order.
    #[must_use]
    pub const fn to_array(self) -> [NodeId; COLUMNS] {
        [self.subject, self.predicate, self.object, self.graph]
    }

    #[must_use]
    pub const fn from_array(columns: [NodeId; COLUMNS]) -> Self {
        Self::new(columns[0], columns[1], columns[2], columns[3])
    }

    /// Value of a column by position.
    ///
    /// # Panics
    ///
    /// Panics if `column >= COLUMNS`.
    #[must_use]
    pub const fn get(self, column: usize) -> NodeId {
        self.to_array()[column]
    }

    /// True when no column is [`NONE`].
    #[must_use]
    pub fn is_fully_bound(self) -> bool {
        self.to_array().iter().all(|&node| node != NONE)
    }

    /// True when the quad may be written to the store.
    #[must_use]
    pub fn is_storable(self) -> bool {
        self.to_array().iter().all(|&node| node >= MIN_NODE)
    }
}

impl From<[NodeId; COLUMNS]> for Quad {
    fn from(columns: [NodeId; COLUMNS]) -> Self {
        Self::from_array(columns)
    }
}

impl fmt::Display for Quad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} {} {} {})",
            self.subject, self.predicate, self.object, self.graph
        )
    }
}
