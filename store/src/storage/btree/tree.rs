//! Copy-on-write B-tree over fixed-width statement keys.
//!
//! A tree is identified by its root page; `0` is the empty tree. Mutation
//! never overwrites a page that another phase may still see: it writes the
//! changed path to fresh pages (path copying) unless the page was allocated
//! by the phase doing the writing. Unreferenced pages are left for the owner
//! of the file to reclaim.
//!
//! Underflow is not rebalanced. A node that becomes empty is unlinked from
//! its parent, and a root with a single child is collapsed.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashSet;

use crate::storage::btree::node::{
    ChildRef, INTERNAL_CAPACITY, InternalNode, Key, LEAF_CAPACITY, LeafNode, Node, NodeError,
};
use crate::storage::io::StorageError;
use crate::storage::page::PageId;

/// Read access to the pages of one file.
pub trait NodeSource {
    fn read_node(&mut self, page_id: PageId) -> Result<Node, TreeError>;
}

/// Write access for the phase that owns the mutation.
pub trait NodeStore: NodeSource {
    fn write_node(&mut self, page_id: PageId, node: &Node) -> Result<(), TreeError>;

    /// Allocate a page that the writing phase owns.
    fn allocate(&mut self) -> Result<PageId, TreeError>;

    /// True if the page may be overwritten in place.
    fn is_writable(&self, page_id: PageId) -> bool;
}

/// Fan-out limits for the nodes of a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeLimits {
    pub max_leaf_keys: usize,
    pub max_children: usize,
}

impl NodeLimits {
    /// Smallest fan-out that still splits into two non-trivial halves.
    pub const MIN_ENTRIES: usize = 4;

    /// Cap both node kinds at `max_entries`, within what a page can hold.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            max_leaf_keys: max_entries.clamp(Self::MIN_ENTRIES, LEAF_CAPACITY),
            max_children: max_entries.clamp(Self::MIN_ENTRIES, INTERNAL_CAPACITY),
        }
    }
}

impl Default for NodeLimits {
    fn default() -> Self {
        Self {
            max_leaf_keys: LEAF_CAPACITY,
            max_children: INTERNAL_CAPACITY,
        }
    }
}

/// A node that was rewritten, with what its parent needs to know.
struct Rewritten {
    page: PageId,
    count: u64,
    first_key: Key,
    split: Option<ChildRef>,
}

enum Removal {
    Absent,
    Emptied,
    Rewritten(Rewritten),
}

/// A B-tree rooted at `root`, mutated through a [`NodeStore`].
pub struct BTree<'a, S: NodeStore + ?Sized> {
    store: &'a mut S,
    root: PageId,
    limits: NodeLimits,
}

impl<'a, S: NodeStore + ?Sized> BTree<'a, S> {
    #[must_use]
    pub const fn new(store: &'a mut S, root: PageId, limits: NodeLimits) -> Self {
        Self {
            store,
            root,
            limits,
        }
    }

    /// The current root page. Changes as the tree is mutated.
    #[must_use]
    pub const fn root(&self) -> PageId {
        self.root
    }

    /// Insert a key. Returns false if it was already present.
    pub fn insert(&mut self, key: Key) -> Result<bool, TreeError> {
        if self.root == 0 {
            let page = self.store.allocate()?;
            self.store
                .write_node(page, &Node::Leaf(LeafNode::new(vec![key])))?;
            self.root = page;
            return Ok(true);
        }

        let Some(rewritten) = self.insert_into(self.root, key)? else {
            return Ok(false);
        };

        self.root = match rewritten.split {
            None => rewritten.page,
            Some(split) => {
                let left = ChildRef {
                    first_key: rewritten.first_key,
                    page: rewritten.page,
                    count: rewritten.count,
                };
                self.place(Node::Internal(InternalNode::new(vec![left, split])))?
                    .page
            }
        };
        Ok(true)
    }

    /// Remove a key. Returns false if it was not present.
    pub fn remove(&mut self, key: &Key) -> Result<bool, TreeError> {
        if self.root == 0 {
            return Ok(false);
        }

        match self.remove_from(self.root, key)? {
            Removal::Absent => return Ok(false),
            Removal::Emptied => self.root = 0,
            Removal::Rewritten(rewritten) => self.root = rewritten.page,
        }

        // Collapse single-child roots.
        while self.root != 0 {
            match self.store.read_node(self.root)? {
                Node::Internal(internal) if internal.children.len() == 1 => {
                    self.root = internal.children[0].page;
                }
                _ => break,
            }
        }
        Ok(true)
    }

    fn insert_into(&mut self, page_id: PageId, key: Key) -> Result<Option<Rewritten>, TreeError> {
        match self.store.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                if !leaf.insert(key) {
                    return Ok(None);
                }
                let split = if leaf.keys.len() > self.limits.max_leaf_keys {
                    Some(self.place(Node::Leaf(leaf.split_off()))?)
                } else {
                    None
                };
                self.rewrite(page_id, &Node::Leaf(leaf), split).map(Some)
            }
            Node::Internal(mut internal) => {
                let index = internal.find_child_index(&key);
                let child = *internal
                    .children
                    .get(index)
                    .ok_or_else(|| TreeError::Corruption(format!("internal page {page_id} has no children")))?;
                let Some(rewritten) = self.insert_into(child.page, key)? else {
                    return Ok(None);
                };

                internal.children[index] = ChildRef {
                    first_key: if index == 0 {
                        rewritten.first_key
                    } else {
                        child.first_key
                    },
                    page: rewritten.page,
                    count: rewritten.count,
                };
                if let Some(split) = rewritten.split {
                    internal.children.insert(index + 1, split);
                }

                let split = if internal.children.len() > self.limits.max_children {
                    Some(self.place(Node::Internal(internal.split_off()))?)
                } else {
                    None
                };
                self.rewrite(page_id, &Node::Internal(internal), split)
                    .map(Some)
            }
        }
    }

    fn remove_from(&mut self, page_id: PageId, key: &Key) -> Result<Removal, TreeError> {
        match self.store.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                if !leaf.remove(key) {
                    return Ok(Removal::Absent);
                }
                if leaf.keys.is_empty() {
                    return Ok(Removal::Emptied);
                }
                self.rewrite(page_id, &Node::Leaf(leaf), None)
                    .map(Removal::Rewritten)
            }
            Node::Internal(mut internal) => {
                let index = internal.find_child_index(key);
                let Some(child) = internal.children.get(index).copied() else {
                    return Ok(Removal::Absent);
                };

                match self.remove_from(child.page, key)? {
                    Removal::Absent => return Ok(Removal::Absent),
                    Removal::Emptied => {
                        internal.children.remove(index);
                        if internal.children.is_empty() {
                            return Ok(Removal::Emptied);
                        }
                    }
                    Removal::Rewritten(rewritten) => {
                        internal.children[index] = ChildRef {
                            first_key: if index == 0 {
                                rewritten.first_key
                            } else {
                                child.first_key
                            },
                            page: rewritten.page,
                            count: rewritten.count,
                        };
                    }
                }
                self.rewrite(page_id, &Node::Internal(internal), None)
                    .map(Removal::Rewritten)
            }
        }
    }

    /// Write a modified node, in place if the page is owned, else to a copy.
    fn rewrite(
        &mut self,
        page_id: PageId,
        node: &Node,
        split: Option<ChildRef>,
    ) -> Result<Rewritten, TreeError> {
        let page = if self.store.is_writable(page_id) {
            page_id
        } else {
            self.store.allocate()?
        };
        self.store.write_node(page, node)?;

        Ok(Rewritten {
            page,
            count: node.count(),
            first_key: first_key_of(node, page)?,
            split,
        })
    }

    /// Write a new node to a fresh page.
    fn place(&mut self, node: Node) -> Result<ChildRef, TreeError> {
        let page = self.store.allocate()?;
        self.store.write_node(page, &node)?;
        Ok(ChildRef {
            first_key: first_key_of(&node, page)?,
            page,
            count: node.count(),
        })
    }
}

fn first_key_of(node: &Node, page: PageId) -> Result<Key, TreeError> {
    node.first_key()
        .ok_or_else(|| TreeError::Corruption(format!("page {page} holds an empty node")))
}

/// True if `key` is in the tree.
pub fn contains<S: NodeSource + ?Sized>(
    source: &mut S,
    root: PageId,
    key: &Key,
) -> Result<bool, TreeError> {
    let mut page = root;
    while page != 0 {
        match source.read_node(page)? {
            Node::Leaf(leaf) => return Ok(leaf.contains(key)),
            Node::Internal(internal) => {
                page = internal
                    .children
                    .get(internal.find_child_index(key))
                    .map_or(0, |child| child.page);
            }
        }
    }
    Ok(false)
}

/// Number of keys strictly less than `key`.
pub fn rank<S: NodeSource + ?Sized>(
    source: &mut S,
    root: PageId,
    key: &Key,
) -> Result<u64, TreeError> {
    let mut below = 0;
    let mut page = root;
    while page != 0 {
        match source.read_node(page)? {
            Node::Leaf(leaf) => {
                return Ok(below + leaf.keys.partition_point(|k| k < key) as u64);
            }
            Node::Internal(internal) => {
                let index = internal.find_child_index(key);
                below += internal.children[..index]
                    .iter()
                    .map(|child| child.count)
                    .sum::<u64>();
                page = internal.children.get(index).map_or(0, |child| child.page);
            }
        }
    }
    Ok(below)
}

/// Add every page reachable from `root` to `visited`.
///
/// Subtrees whose root is already in `visited` are not walked again, so
/// marking several phases that share structure costs one walk of the union.
pub fn mark_reachable<S: NodeSource + ?Sized>(
    source: &mut S,
    root: PageId,
    visited: &mut HashSet<PageId>,
) -> Result<(), TreeError> {
    let mut pending = vec![root];
    while let Some(page) = pending.pop() {
        if page == 0 || !visited.insert(page) {
            continue;
        }
        if let Node::Internal(internal) = source.read_node(page)? {
            pending.extend(internal.children.iter().map(|child| child.page));
        }
    }
    Ok(())
}

/// Count the keys by walking every leaf, checking ordering and the subtree
/// counts recorded in internal nodes along the way.
pub fn recount<S: NodeSource + ?Sized>(source: &mut S, root: PageId) -> Result<u64, TreeError> {
    let mut previous = None;
    if root == 0 {
        return Ok(0);
    }
    recount_subtree(source, root, &mut previous)
}

fn recount_subtree<S: NodeSource + ?Sized>(
    source: &mut S,
    page: PageId,
    previous: &mut Option<Key>,
) -> Result<u64, TreeError> {
    match source.read_node(page)? {
        Node::Leaf(leaf) => {
            for key in &leaf.keys {
                if previous.is_some_and(|p| p >= *key) {
                    return Err(TreeError::Corruption(format!(
                        "page {page}: key {key:?} out of order"
                    )));
                }
                *previous = Some(*key);
            }
            Ok(leaf.keys.len() as u64)
        }
        Node::Internal(internal) => {
            let mut total = 0;
            for child in &internal.children {
                let counted = recount_subtree(source, child.page, previous)?;
                if counted != child.count {
                    return Err(TreeError::Corruption(format!(
                        "page {page}: child {} records {} keys but holds {counted}",
                        child.page, child.count
                    )));
                }
                total += counted;
            }
            Ok(total)
        }
    }
}

/// A position in a tree, held as the decoded path from the root.
///
/// Cursors do not borrow the file, so they can be cloned and kept across
/// calls; every movement takes the source to read from.
#[derive(Debug, Clone, Default)]
pub struct TreeCursor {
    stack: Vec<Frame>,
}

#[derive(Debug, Clone)]
enum Frame {
    Internal { node: InternalNode, pos: usize },
    Leaf { node: LeafNode, pos: usize },
}

impl TreeCursor {
    /// Position at the first key greater than or equal to `key`.
    pub fn seek<S: NodeSource + ?Sized>(
        source: &mut S,
        root: PageId,
        key: &Key,
    ) -> Result<Self, TreeError> {
        let mut cursor = Self::default();
        let mut page = root;
        while page != 0 {
            match source.read_node(page)? {
                Node::Leaf(node) => {
                    let pos = node.keys.partition_point(|k| k < key);
                    cursor.stack.push(Frame::Leaf { node, pos });
                    page = 0;
                }
                Node::Internal(node) => {
                    let pos = node.find_child_index(key);
                    page = node.children.get(pos).map_or(0, |child| child.page);
                    cursor.stack.push(Frame::Internal { node, pos });
                }
            }
        }
        cursor.settle(source)?;
        Ok(cursor)
    }

    /// The key under the cursor, or `None` once past the end.
    #[must_use]
    pub fn current(&self) -> Option<Key> {
        match self.stack.last() {
            Some(Frame::Leaf { node, pos }) => node.keys.get(*pos).copied(),
            _ => None,
        }
    }

    /// Move to the next key.
    pub fn advance<S: NodeSource + ?Sized>(&mut self, source: &mut S) -> Result<(), TreeError> {
        if let Some(Frame::Leaf { pos, .. }) = self.stack.last_mut() {
            *pos += 1;
        }
        self.settle(source)
    }

    /// Climb out of exhausted nodes and descend to the next leaf entry.
    fn settle<S: NodeSource + ?Sized>(&mut self, source: &mut S) -> Result<(), TreeError> {
        loop {
            let next_page = match self.stack.last_mut() {
                None => return Ok(()),
                Some(Frame::Leaf { node, pos }) => {
                    if *pos < node.keys.len() {
                        return Ok(());
                    }
                    None
                }
                Some(Frame::Internal { node, pos }) => {
                    node.children.get(*pos).map(|child| child.page)
                }
            };

            match next_page {
                Some(page) => match source.read_node(page)? {
                    Node::Leaf(node) => self.stack.push(Frame::Leaf { node, pos: 0 }),
                    Node::Internal(node) => self.stack.push(Frame::Internal { node, pos: 0 }),
                },
                None => {
                    self.stack.pop();
                    if let Some(Frame::Internal { pos, .. }) = self.stack.last_mut() {
                        *pos += 1;
                    }
                }
            }
        }
    }
}

/// Errors that can occur during B-tree operations.
#[derive(Debug)]
pub enum TreeError {
    /// Storage error.
    Storage(StorageError),
    /// Node decode error.
    Node(NodeError),
    /// Structural damage found while walking the tree.
    Corruption(String),
    /// A thread panicked while holding the index file.
    Poisoned,
}

impl std::fmt::Display for TreeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Corruption(msg) => write!(f, "tree corruption: {msg}"),
            Self::Poisoned => write!(f, "index file lock poisoned"),
        }
    }
}

impl std::error::Error for TreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Corruption(_) | Self::Poisoned => None,
        }
    }
}

impl From<StorageError> for TreeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for TreeError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}
