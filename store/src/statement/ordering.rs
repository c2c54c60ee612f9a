//! The six index orderings and the tables that pick one for a query.

use crate::storage::btree::Key;
use crate::types::{COLUMNS, NONE, Quad};

/// Bit set of bound columns: bit `i` is statement column `i`.
pub type Mask = u8;

pub const MASK_SUBJECT: Mask = 1;
pub const MASK_PREDICATE: Mask = 2;
pub const MASK_OBJECT: Mask = 4;
pub const MASK_GRAPH: Mask = 8;
pub const MASK_ALL: Mask = 15;

/// Mask of the columns flagged in `bound`.
#[must_use]
pub fn mask_of(bound: [bool; COLUMNS]) -> Mask {
    bound
        .iter()
        .enumerate()
        .filter(|(_, bound)| **bound)
        .fold(0, |mask, (column, _)| mask | (1 << column))
}

/// Mask of the columns of `pattern` that are not [`NONE`].
#[must_use]
pub fn mask_for(pattern: &Quad) -> Mask {
    mask_of(pattern.to_array().map(|node| node != NONE))
}

/// A column permutation of the statement relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexOrder {
    Spog,
    Posg,
    Ospg,
    Gspo,
    Gpos,
    Gosp,
}

/// Ordering used for each of the sixteen bound-column masks.
const SELECT_INDEX: [IndexOrder; 16] = [
    IndexOrder::Spog,
    IndexOrder::Spog,
    IndexOrder::Posg,
    IndexOrder::Spog,
    IndexOrder::Ospg,
    IndexOrder::Ospg,
    IndexOrder::Posg,
    IndexOrder::Spog,
    IndexOrder::Gspo,
    IndexOrder::Gspo,
    IndexOrder::Gpos,
    IndexOrder::Gspo,
    IndexOrder::Gosp,
    IndexOrder::Gosp,
    IndexOrder::Gpos,
    IndexOrder::Spog,
];

impl IndexOrder {
    /// Every ordering, in metaroot order.
    pub const ALL: [Self; 6] = [
        Self::Spog,
        Self::Posg,
        Self::Ospg,
        Self::Gspo,
        Self::Gpos,
        Self::Gosp,
    ];

    /// Statement column stored at each index column.
    #[must_use]
    pub const fn columns(self) -> [usize; COLUMNS] {
        match self {
            Self::Spog => [0, 1, 2, 3],
            Self::Posg => [1, 2, 0, 3],
            Self::Ospg => [2, 0, 1, 3],
            Self::Gspo => [3, 0, 1, 2],
            Self::Gpos => [3, 1, 2, 0],
            Self::Gosp => [3, 2, 0, 1],
        }
    }

    /// Position of this ordering in [`Self::ALL`].
    #[must_use]
    pub const fn position(self) -> usize {
        match self {
            Self::Spog => 0,
            Self::Posg => 1,
            Self::Ospg => 2,
            Self::Gspo => 3,
            Self::Gpos => 4,
            Self::Gosp => 5,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spog => "SPOG",
            Self::Posg => "POSG",
            Self::Ospg => "OSPG",
            Self::Gspo => "GSPO",
            Self::Gpos => "GPOS",
            Self::Gosp => "GOSP",
        }
    }

    /// The permutation digits used in index file names.
    #[must_use]
    pub const fn file_suffix(self) -> &'static str {
        match self {
            Self::Spog => "0123",
            Self::Posg => "1203",
            Self::Ospg => "2013",
            Self::Gspo => "3012",
            Self::Gpos => "3120",
            Self::Gosp => "3201",
        }
    }

    /// The ordering that puts the columns of `mask` first.
    #[must_use]
    pub const fn for_mask(mask: Mask) -> Self {
        SELECT_INDEX[(mask & MASK_ALL) as usize]
    }

    /// The first ordering whose leading columns are exactly `bound`,
    /// followed by the rest of `mask`.
    #[must_use]
    pub fn for_explicit_mask(mask: Mask, bound: Mask) -> Option<Self> {
        let bound_len = bound.count_ones() as usize;
        let mask_len = mask.count_ones() as usize;
        Self::ALL.into_iter().find(|order| {
            order.leading_mask(bound_len) == bound && order.leading_mask(mask_len) == mask
        })
    }

    /// Mask of the first `len` index columns.
    #[must_use]
    pub fn leading_mask(self, len: usize) -> Mask {
        self.columns()
            .iter()
            .take(len)
            .fold(0, |mask, column| mask | (1 << column))
    }

    /// Permute a statement into this ordering's key.
    #[must_use]
    pub fn to_key(self, quad: &Quad) -> Key {
        let nodes = quad.to_array();
        self.columns().map(|column| nodes[column])
    }

    /// Restore a statement from this ordering's key.
    #[must_use]
    pub fn to_quad(self, key: &Key) -> Quad {
        let mut nodes = [NONE; COLUMNS];
        for (value, column) in key.iter().zip(self.columns()) {
            nodes[column] = *value;
        }
        Quad::from_array(nodes)
    }
}

impl std::fmt::Display for IndexOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
