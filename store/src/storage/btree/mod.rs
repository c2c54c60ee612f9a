//! Counted copy-on-write B-tree for the statement indexes.
//!
//! # Structure
//!
//! - Internal nodes: per child, its lowest key, page and subtree key count
//! - Leaf nodes: sorted keys only; a statement is its own key
//!
//! # Key Format
//!
//! Keys are 32 bytes: four little-endian `i64` node ids in the column order
//! of the index that owns the tree.

mod node;
mod tree;

pub use node::{
    ChildRef, INTERNAL_CAPACITY, InternalNode, KEY_SIZE, Key, LEAF_CAPACITY, LeafNode, Node,
    NodeError, NodeType,
};
pub use tree::{
    BTree, NodeLimits, NodeSource, NodeStore, TreeCursor, TreeError, contains, mark_reachable,
    rank, recount,
};
