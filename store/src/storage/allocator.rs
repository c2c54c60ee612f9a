//! Page allocator using a bitmap to track free/used pages.
//!
//! The bitmap is never persisted. Index pages are shared between phases, so
//! whether a page is in use depends on which phases are alive; the bitmap is
//! rebuilt from the live roots whenever that set is re-established (on
//! open, clear and garbage sweeps). Each bit represents one page:
//! 0 = free, 1 = used.

// Page IDs are u64 but bitmap indices are usize. On 64-bit systems these are the same size.
#![allow(clippy::cast_possible_truncation)]

use crate::storage::page::PageId;

/// Number of bits per byte.
const BITS_PER_BYTE: usize = 8;

/// A page allocation bitmap.
#[derive(Debug, Clone)]
pub struct PageAllocator {
    bitmap: Vec<u8>,
    total_pages: u64,
    free_count: u64,
    /// Hint for next free page search.
    next_search_hint: u64,
}

impl PageAllocator {
    /// Create an allocator where pages `0..reserved` are used and the rest free.
    #[must_use]
    pub fn new(total_pages: u64, reserved: u64) -> Self {
        Self::with_used(total_pages, 0..reserved.min(total_pages))
    }

    /// Create an allocator where exactly the given pages are used.
    ///
    /// Page ids at or beyond `total_pages` are ignored.
    #[must_use]
    pub fn with_used(total_pages: u64, used: impl IntoIterator<Item = PageId>) -> Self {
        let mut bitmap = vec![0u8; (total_pages as usize).div_ceil(BITS_PER_BYTE)];
        let mut used_count = 0;
        for page_id in used {
            if page_id < total_pages && !get_bit(&bitmap, page_id as usize) {
                set_bit(&mut bitmap, page_id as usize);
                used_count += 1;
            }
        }

        Self {
            bitmap,
            total_pages,
            free_count: total_pages - used_count,
            next_search_hint: 0,
        }
    }

    /// Allocate a single free page.
    ///
    /// Returns `None` if no free pages are available.
    pub fn allocate(&mut self) -> Option<PageId> {
        if self.free_count == 0 {
            return None;
        }

        let hint = self.next_search_hint.min(self.total_pages);
        let page_id = (hint..self.total_pages)
            .chain(0..hint)
            .find(|&page_id| !get_bit(&self.bitmap, page_id as usize))?;

        set_bit(&mut self.bitmap, page_id as usize);
        self.free_count -= 1;
        self.next_search_hint = page_id + 1;
        Some(page_id)
    }

    /// Return a page to the free pool.
    pub fn free(&mut self, page_id: PageId) {
        if page_id >= self.total_pages {
            return;
        }

        if get_bit(&self.bitmap, page_id as usize) {
            clear_bit(&mut self.bitmap, page_id as usize);
            self.free_count += 1;
            if page_id < self.next_search_hint {
                self.next_search_hint = page_id;
            }
        }
    }

    #[must_use]
    pub fn is_allocated(&self, page_id: PageId) -> bool {
        page_id < self.total_pages && get_bit(&self.bitmap, page_id as usize)
    }

    #[must_use]
    pub const fn free_count(&self) -> u64 {
        self.free_count
    }

    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total_pages
    }

    /// Track more pages. The new pages are free.
    pub fn expand(&mut self, new_total_pages: u64) {
        if new_total_pages <= self.total_pages {
            return;
        }

        self.bitmap
            .resize((new_total_pages as usize).div_ceil(BITS_PER_BYTE), 0);
        self.free_count += new_total_pages - self.total_pages;
        self.total_pages = new_total_pages;
    }
}

fn get_bit(bitmap: &[u8], index: usize) -> bool {
    let byte_index = index / BITS_PER_BYTE;
    byte_index < bitmap.len() && (bitmap[byte_index] & (1 << (index % BITS_PER_BYTE))) != 0
}

fn set_bit(bitmap: &mut [u8], index: usize) {
    let byte_index = index / BITS_PER_BYTE;
    if byte_index < bitmap.len() {
        bitmap[byte_index] |= 1 << (index % BITS_PER_BYTE);
    }
}

fn clear_bit(bitmap: &mut [u8], index: usize) {
    let byte_index = index / BITS_PER_BYTE;
    if byte_index < bitmap.len() {
        bitmap[byte_index] &= !(1 << (index % BITS_PER_BYTE));
    }
}
