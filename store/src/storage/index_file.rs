//! One index file: the trees of a single ordering across all phases.
//!
//! # File Layout
//!
//! - Page 0: header (magic `QSTOREIX`, format version, permutation)
//! - Pages 1-N: B-tree nodes of every live phase, sharing unchanged pages
//!
//! Pages are never freed one at a time. When the free map runs dry the file
//! marks every page reachable from a live phase (as reported by the
//! [`PhaseRegistry`]) plus the pages owned by the phase being written, and
//! frees the rest. If that reclaims less than a quarter of the file, the file
//! grows instead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::statement::ordering::IndexOrder;
use crate::statement::phase::{IndexRoot, PhaseRegistry};
use crate::storage::allocator::PageAllocator;
use crate::storage::btree::{
    BTree, Key, Node, NodeError, NodeLimits, NodeSource, NodeStore, TreeCursor, TreeError,
    contains, mark_reachable, rank, recount,
};
use crate::storage::io::Storage;
use crate::storage::page::{Page, PageHeader, PageId, PageType};
use crate::types::{COLUMNS, NodeId, Quad};

/// Magic bytes at the start of the header page body.
pub const INDEX_MAGIC: &[u8; 8] = b"QSTOREIX";

/// Current index file format version.
pub const INDEX_VERSION: u32 = 1;

const HEADER_PAGE: PageId = 0;
const MAGIC_OFFSET: usize = PageHeader::SIZE;
const VERSION_OFFSET: usize = MAGIC_OFFSET + 8;
const PERMUTATION_OFFSET: usize = VERSION_OFFSET + 4;

/// Smallest number of pages added when the file grows.
const MIN_GROWTH: u64 = 16;

/// The index file for one [`IndexOrder`].
pub struct IndexFile {
    order: IndexOrder,
    inner: Mutex<Inner>,
}

struct Inner {
    order: IndexOrder,
    storage: Box<dyn Storage>,
    allocator: PageAllocator,
    /// Pages allocated by the phase being written; only these may be
    /// overwritten in place.
    owned: HashSet<PageId>,
    limits: NodeLimits,
    registry: Arc<PhaseRegistry>,
}

impl IndexFile {
    /// Open an index file, writing a header if it is empty.
    ///
    /// Every existing page counts as used until [`Self::adopt`] or
    /// [`Self::clear`] rebuilds the free map.
    pub fn open(
        mut storage: Box<dyn Storage>,
        order: IndexOrder,
        registry: Arc<PhaseRegistry>,
        limits: NodeLimits,
    ) -> Result<Self, TreeError> {
        if storage.total_pages() == 0 {
            write_header(storage.as_mut(), order)?;
        } else {
            check_header(&storage.read_page(HEADER_PAGE)?, order)?;
        }
        let total_pages = storage.total_pages();

        Ok(Self {
            order,
            inner: Mutex::new(Inner {
                order,
                storage,
                allocator: PageAllocator::new(total_pages, total_pages),
                owned: HashSet::new(),
                limits,
                registry,
            }),
        })
    }

    #[must_use]
    pub const fn order(&self) -> IndexOrder {
        self.order
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>, TreeError> {
        self.inner.lock().map_err(|_| TreeError::Poisoned)
    }

    /// Drop every tree, leaving only the header page.
    pub fn clear(&self) -> Result<(), TreeError> {
        let mut inner = self.inner()?;
        inner.storage.truncate(0)?;
        write_header(inner.storage.as_mut(), self.order)?;
        inner.allocator = PageAllocator::new(1, 1);
        inner.owned.clear();
        Ok(())
    }

    /// Rebuild the free map from the phases now in the registry.
    pub fn adopt(&self) -> Result<(), TreeError> {
        let mut inner = self.inner()?;
        inner.owned.clear();
        inner.sweep().map(|_| ())
    }

    /// Start writing a new phase: pages of earlier phases become read-only.
    pub fn begin_phase(&self) -> Result<(), TreeError> {
        self.inner()?.owned.clear();
        Ok(())
    }

    /// Insert a statement. Returns the new root, or `None` if it was present.
    pub fn insert(&self, root: IndexRoot, quad: &Quad) -> Result<Option<IndexRoot>, TreeError> {
        let mut inner = self.inner()?;
        let limits = inner.limits;
        let mut tree = BTree::new(&mut *inner, root.root, limits);
        if !tree.insert(self.order.to_key(quad))? {
            return Ok(None);
        }
        Ok(Some(IndexRoot {
            root: tree.root(),
            count: root.count + 1,
        }))
    }

    /// Remove a statement. Returns the new root, or `None` if it was absent.
    pub fn remove(&self, root: IndexRoot, quad: &Quad) -> Result<Option<IndexRoot>, TreeError> {
        let mut inner = self.inner()?;
        let limits = inner.limits;
        let mut tree = BTree::new(&mut *inner, root.root, limits);
        if !tree.remove(&self.order.to_key(quad))? {
            return Ok(None);
        }
        Ok(Some(IndexRoot {
            root: tree.root(),
            count: root.count.saturating_sub(1),
        }))
    }

    /// True if `key` (in this file's column order) is in the tree.
    pub fn contains(&self, root: IndexRoot, key: &Key) -> Result<bool, TreeError> {
        contains(&mut *self.inner()?, root.root, key)
    }

    /// Number of keys in `[lo, hi)`; an absent `hi` means no upper bound.
    pub fn count_range(&self, root: IndexRoot, lo: &Key, hi: Option<&Key>) -> Result<u64, TreeError> {
        let mut inner = self.inner()?;
        let below_lo = rank(&mut *inner, root.root, lo)?;
        let below_hi = match hi {
            Some(hi) => rank(&mut *inner, root.root, hi)?,
            None => root.count,
        };
        Ok(below_hi.saturating_sub(below_lo))
    }

    /// Number of keys starting with `prefix`.
    pub fn count_prefix(&self, root: IndexRoot, prefix: &[NodeId]) -> Result<u64, TreeError> {
        if prefix.is_empty() {
            return Ok(root.count);
        }
        let successor = prefix_successor(prefix);
        self.count_range(root, &lower_bound(prefix), successor.as_ref())
    }

    /// A cursor on the first key at or after `key`.
    pub fn seek(&self, root: IndexRoot, key: &Key) -> Result<TreeCursor, TreeError> {
        TreeCursor::seek(&mut *self.inner()?, root.root, key)
    }

    /// Move a cursor obtained from [`Self::seek`] to the next key.
    pub fn advance(&self, cursor: &mut TreeCursor) -> Result<(), TreeError> {
        cursor.advance(&mut *self.inner()?)
    }

    /// Make every written page durable.
    pub fn force(&self) -> Result<(), TreeError> {
        self.inner()?.storage.sync()?;
        Ok(())
    }

    /// Count the statements in a tree by walking it.
    pub fn recount(&self, root: IndexRoot) -> Result<u64, TreeError> {
        recount(&mut *self.inner()?, root.root)
    }

    #[cfg(test)]
    fn total_pages(&self) -> u64 {
        self.inner().expect("index file").storage.total_pages()
    }
}

impl Inner {
    /// Free every page not reachable from a live phase. Returns the number
    /// of pages reclaimed.
    fn sweep(&mut self) -> Result<u64, TreeError> {
        let mut live = HashSet::with_capacity(self.owned.len() + 1);
        live.insert(HEADER_PAGE);
        live.extend(self.owned.iter().copied());
        for root in self.registry.live_roots(self.order) {
            mark_reachable(self, root, &mut live)?;
        }

        let free_before = self.allocator.free_count();
        let total_pages = self.storage.total_pages();
        self.allocator = PageAllocator::with_used(total_pages, live);
        let reclaimed = self.allocator.free_count().saturating_sub(free_before);
        debug!(
            index = %self.order,
            total_pages,
            reclaimed,
            "swept index file"
        );
        Ok(reclaimed)
    }

    fn grow(&mut self, count: u64) -> Result<(), TreeError> {
        self.storage.allocate_pages(count)?;
        self.allocator.expand(self.storage.total_pages());
        debug!(index = %self.order, total_pages = self.storage.total_pages(), "grew index file");
        Ok(())
    }
}

impl NodeSource for Inner {
    fn read_node(&mut self, page_id: PageId) -> Result<Node, TreeError> {
        let page = self.storage.read_page(page_id)?;
        Ok(Node::from_page(&page)?)
    }
}

impl NodeStore for Inner {
    fn write_node(&mut self, page_id: PageId, node: &Node) -> Result<(), TreeError> {
        self.storage.write_page(page_id, &node.to_page())?;
        Ok(())
    }

    fn allocate(&mut self) -> Result<PageId, TreeError> {
        let page = match self.allocator.allocate() {
            Some(page) => page,
            None => {
                let total_pages = self.storage.total_pages();
                let reclaimed = self.sweep()?;
                if self.allocator.free_count() == 0 || reclaimed < total_pages / 4 {
                    self.grow((total_pages / 2).max(MIN_GROWTH))?;
                }
                self.allocator.allocate().ok_or_else(|| {
                    TreeError::Corruption(format!("{} has no free page after growing", self.order))
                })?
            }
        };
        self.owned.insert(page);
        Ok(page)
    }

    fn is_writable(&self, page_id: PageId) -> bool {
        self.owned.contains(&page_id)
    }
}

/// Smallest key starting with `prefix`.
#[must_use]
pub fn lower_bound(prefix: &[NodeId]) -> Key {
    let mut key = [NodeId::MIN; COLUMNS];
    for (column, value) in key.iter_mut().zip(prefix) {
        *column = *value;
    }
    key
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// if there is none (an empty or all-maximum prefix).
#[must_use]
pub fn prefix_successor(prefix: &[NodeId]) -> Option<Key> {
    let mut next = lower_bound(prefix);
    for column in (0..prefix.len().min(COLUMNS)).rev() {
        if next[column] == NodeId::MAX {
            next[column] = NodeId::MIN;
        } else {
            next[column] += 1;
            return Some(next);
        }
    }
    None
}

fn write_header(storage: &mut dyn Storage, order: IndexOrder) -> Result<(), TreeError> {
    if storage.total_pages() == 0 {
        storage.allocate_pages(1)?;
    }
    let mut page = Page::with_type(PageType::IndexHeader);
    page.write_bytes(MAGIC_OFFSET, INDEX_MAGIC);
    page.write_u32(VERSION_OFFSET, INDEX_VERSION);
    for (i, column) in order.columns().iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        page.write_u8(PERMUTATION_OFFSET + i, *column as u8);
    }
    page.seal();
    storage.write_page(HEADER_PAGE, &page)?;
    Ok(())
}

fn check_header(page: &Page, order: IndexOrder) -> Result<(), TreeError> {
    let header = page.verify().map_err(NodeError::from)?;
    if header.page_type != PageType::IndexHeader || page.read_bytes(MAGIC_OFFSET, 8) != INDEX_MAGIC {
        return Err(TreeError::Corruption(format!(
            "{order} index file has no index header"
        )));
    }
    let version = page.read_u32(VERSION_OFFSET);
    if version != INDEX_VERSION {
        return Err(TreeError::Corruption(format!(
            "{order} index file has unsupported version {version}"
        )));
    }
    let permutation = page.read_bytes(PERMUTATION_OFFSET, COLUMNS);
    if permutation
        .iter()
        .zip(order.columns())
        .any(|(stored, column)| usize::from(*stored) != column)
    {
        return Err(TreeError::Corruption(format!(
            "index file holds permutation {permutation:?}, expected {order}"
        )));
    }
    Ok(())
}
