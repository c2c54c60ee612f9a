//! B-tree node types and serialization.
//!
//! Keys are whole statements already permuted into an index's column order,
//! so leaves hold keys only. Internal nodes keep the tuple count of every
//! child subtree, which makes range counts logarithmic.
//!
//! Nodes carry no parent or sibling pointers: pages are shared between
//! phases, so a node may have several parents at once.

#![allow(clippy::cast_possible_truncation)]

use crate::storage::page::{PAGE_SIZE, Page, PageError, PageHeader, PageId, PageType};
use crate::types::{COLUMNS, NodeId};

/// Size of a key in bytes (four 8-byte node ids).
pub const KEY_SIZE: usize = COLUMNS * 8;

/// A statement in index column order.
pub type Key = [NodeId; COLUMNS];

/// Node header layout (after page header):
/// - `node_type`: 1 byte (0 = internal, 1 = leaf)
/// - `entry_count`: 2 bytes
/// - `reserved`: 5 bytes
const NODE_HEADER_SIZE: usize = 8;

/// Offset where node data starts (after page header + node header).
const DATA_OFFSET: usize = PageHeader::SIZE + NODE_HEADER_SIZE;

/// Available space for node data.
const DATA_SPACE: usize = PAGE_SIZE - DATA_OFFSET;

/// Internal entry: first key (32 bytes) + child page (8 bytes) + subtree count (8 bytes).
const INTERNAL_ENTRY_SIZE: usize = KEY_SIZE + 16;

/// Maximum number of keys a leaf page can hold.
pub const LEAF_CAPACITY: usize = DATA_SPACE / KEY_SIZE;

/// Maximum number of children an internal page can hold.
pub const INTERNAL_CAPACITY: usize = DATA_SPACE / INTERNAL_ENTRY_SIZE;

/// Node type discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeType {
    Internal = 0,
    Leaf = 1,
}

impl TryFrom<u8> for NodeType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Internal),
            1 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

/// A child pointer in an internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildRef {
    /// Lower bound of the keys in the child. Every key in the previous
    /// child is smaller. Not meaningful for the first child.
    pub first_key: Key,
    pub page: PageId,
    /// Number of keys in the child subtree.
    pub count: u64,
}

/// An internal (non-leaf) node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InternalNode {
    pub children: Vec<ChildRef>,
}

impl InternalNode {
    #[must_use]
    pub const fn new(children: Vec<ChildRef>) -> Self {
        Self { children }
    }

    /// Index of the child whose range contains `key`.
    #[must_use]
    pub fn find_child_index(&self, key: &Key) -> usize {
        match self.children.get(1..) {
            Some(rest) => rest.partition_point(|child| child.first_key <= *key),
            None => 0,
        }
    }

    /// Number of keys under this node.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.children.iter().map(|child| child.count).sum()
    }

    /// Move the upper half of the children into a new node.
    #[must_use]
    pub fn split_off(&mut self) -> Self {
        let mid = self.children.len() / 2;
        Self::new(self.children.split_off(mid))
    }
}

/// A leaf node: sorted, duplicate-free keys.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LeafNode {
    pub keys: Vec<Key>,
}

impl LeafNode {
    #[must_use]
    pub const fn new(keys: Vec<Key>) -> Self {
        Self { keys }
    }

    /// Binary search for a key.
    pub fn find_index(&self, key: &Key) -> Result<usize, usize> {
        self.keys.binary_search(key)
    }

    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.find_index(key).is_ok()
    }

    /// Insert a key. Returns false if it was already present.
    pub fn insert(&mut self, key: Key) -> bool {
        match self.find_index(&key) {
            Ok(_) => false,
            Err(pos) => {
                self.keys.insert(pos, key);
                true
            }
        }
    }

    /// Remove a key. Returns false if it was not present.
    pub fn remove(&mut self, key: &Key) -> bool {
        match self.find_index(key) {
            Ok(pos) => {
                self.keys.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// Move the upper half of the keys into a new leaf.
    #[must_use]
    pub fn split_off(&mut self) -> Self {
        let mid = self.keys.len() / 2;
        Self::new(self.keys.split_off(mid))
    }
}

/// A decoded node page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

impl Node {
    /// Decode a node page, verifying its checksum.
    pub fn from_page(page: &Page) -> Result<Self, NodeError> {
        let header = page.verify()?;
        let offset = PageHeader::SIZE;
        let node_type = NodeType::try_from(page.read_u8(offset)).map_err(NodeError::InvalidNodeType)?;
        let count = usize::from(page.read_u16(offset + 1));

        match (header.page_type, node_type) {
            (PageType::BTreeLeaf, NodeType::Leaf) => {
                if count > LEAF_CAPACITY {
                    return Err(NodeError::InvalidEntryCount {
                        count,
                        capacity: LEAF_CAPACITY,
                    });
                }
                let keys = (0..count)
                    .map(|i| read_key(page, DATA_OFFSET + i * KEY_SIZE))
                    .collect();
                Ok(Self::Leaf(LeafNode::new(keys)))
            }
            (PageType::BTreeInternal, NodeType::Internal) => {
                if count > INTERNAL_CAPACITY {
                    return Err(NodeError::InvalidEntryCount {
                        count,
                        capacity: INTERNAL_CAPACITY,
                    });
                }
                let children = (0..count)
                    .map(|i| {
                        let entry = DATA_OFFSET + i * INTERNAL_ENTRY_SIZE;
                        ChildRef {
                            first_key: read_key(page, entry),
                            page: page.read_u64(entry + KEY_SIZE),
                            count: page.read_u64(entry + KEY_SIZE + 8),
                        }
                    })
                    .collect();
                Ok(Self::Internal(InternalNode::new(children)))
            }
            (page_type, node_type) => Err(NodeError::TypeMismatch {
                page_type,
                node_type,
            }),
        }
    }

    /// Encode into a sealed page.
    ///
    /// The caller keeps entry counts within capacity.
    #[must_use]
    pub fn to_page(&self) -> Page {
        let offset = PageHeader::SIZE;
        let mut page;
        match self {
            Self::Leaf(leaf) => {
                page = Page::with_type(PageType::BTreeLeaf);
                page.write_u8(offset, NodeType::Leaf as u8);
                page.write_u16(offset + 1, leaf.keys.len() as u16);
                for (i, key) in leaf.keys.iter().enumerate() {
                    write_key(&mut page, DATA_OFFSET + i * KEY_SIZE, key);
                }
            }
            Self::Internal(internal) => {
                page = Page::with_type(PageType::BTreeInternal);
                page.write_u8(offset, NodeType::Internal as u8);
                page.write_u16(offset + 1, internal.children.len() as u16);
                for (i, child) in internal.children.iter().enumerate() {
                    let entry = DATA_OFFSET + i * INTERNAL_ENTRY_SIZE;
                    write_key(&mut page, entry, &child.first_key);
                    page.write_u64(entry + KEY_SIZE, child.page);
                    page.write_u64(entry + KEY_SIZE + 8, child.count);
                }
            }
        }
        page.seal();
        page
    }

    /// Number of keys under this node.
    #[must_use]
    pub fn count(&self) -> u64 {
        match self {
            Self::Leaf(leaf) => leaf.keys.len() as u64,
            Self::Internal(internal) => internal.total(),
        }
    }

    /// Smallest key recorded in this node, if any.
    #[must_use]
    pub fn first_key(&self) -> Option<Key> {
        match self {
            Self::Leaf(leaf) => leaf.keys.first().copied(),
            Self::Internal(internal) => internal.children.first().map(|child| child.first_key),
        }
    }
}

fn read_key(page: &Page, offset: usize) -> Key {
    let mut key = [0; COLUMNS];
    for (i, column) in key.iter_mut().enumerate() {
        *column = page.read_i64(offset + i * 8);
    }
    key
}

fn write_key(page: &mut Page, offset: usize, key: &Key) {
    for (i, column) in key.iter().enumerate() {
        page.write_i64(offset + i * 8, *column);
    }
}

/// Errors that can occur when decoding nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Invalid node type byte.
    InvalidNodeType(u8),
    /// Entry count larger than the page can hold.
    InvalidEntryCount { count: usize, capacity: usize },
    /// Page type and node type disagree.
    TypeMismatch {
        page_type: PageType,
        node_type: NodeType,
    },
    /// Page header or checksum error.
    Page(PageError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidNodeType(v) => write!(f, "invalid node type: {v}"),
            Self::InvalidEntryCount { count, capacity } => {
                write!(f, "entry count {count} exceeds capacity {capacity}")
            }
            Self::TypeMismatch {
                page_type,
                node_type,
            } => write!(f, "page type {page_type:?} holds a {node_type:?} node"),
            Self::Page(e) => write!(f, "page error: {e}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Page(e) => Some(e),
            _ => None,
        }
    }
}

impl From<PageError> for NodeError {
    fn from(e: PageError) -> Self {
        Self::Page(e)
    }
}
